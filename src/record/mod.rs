//! Crawl record model
//!
//! This module defines the per-URL state kept in the crawl-state store.
//!
//! # Components
//!
//! - `CrawlRecord`: Status, next fetch time, score and metadata of one URL
//! - `CrawlStatus`: The lifecycle status of a URL
//! - `Metadata`: Typed side-channel values, used to stash the generation mark
//! - `GenerationMark`: Timestamp identifying which generate run claimed a record

mod metadata;
mod status;

pub use metadata::{MetaValue, Metadata};
pub use status::CrawlStatus;

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

/// Metadata key under which the generation mark is stored
pub const GENERATE_TIME_KEY: &str = "_ngt_";

/// Timestamp (epoch milliseconds) chosen once per generate run
///
/// Every record selected by a run carries the run's mark in its metadata, which
/// lets the store update stage tell this run's claims apart from claims left by
/// an earlier run that never completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationMark(i64);

impl GenerationMark {
    /// Creates a mark from epoch milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a mark from a point in time
    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        Self(time.timestamp_millis())
    }

    /// Creates a mark for the current instant
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Returns the mark as epoch milliseconds
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns the mark as a point in time
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl fmt::Display for GenerationMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a single URL in the crawl-state store
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRecord {
    /// Lifecycle status
    pub status: CrawlStatus,

    /// Earliest instant at which the URL is due for fetching
    pub fetch_time: DateTime<Utc>,

    /// Priority signal maintained by the scoring policy
    pub score: f32,

    /// Opaque typed values attached to the record
    pub metadata: Metadata,
}

impl CrawlRecord {
    /// Creates a record with empty metadata
    pub fn new(status: CrawlStatus, fetch_time: DateTime<Utc>, score: f32) -> Self {
        Self {
            status,
            fetch_time,
            score,
            metadata: Metadata::new(),
        }
    }

    /// Returns the generation mark stored in the metadata, if any
    ///
    /// A value of the wrong type is treated as absent.
    pub fn generation_mark(&self) -> Option<GenerationMark> {
        match self.metadata.get(GENERATE_TIME_KEY) {
            Some(MetaValue::Long(millis)) => Some(GenerationMark::from_millis(*millis)),
            _ => None,
        }
    }

    /// Stamps the record with a generation mark, replacing any previous one
    pub fn set_generation_mark(&mut self, mark: GenerationMark) {
        self.metadata
            .insert(GENERATE_TIME_KEY, MetaValue::Long(mark.as_millis()));
    }

    /// Removes the generation mark, returning it if one was present
    pub fn clear_generation_mark(&mut self) -> Option<GenerationMark> {
        match self.metadata.remove(GENERATE_TIME_KEY) {
            Some(MetaValue::Long(millis)) => Some(GenerationMark::from_millis(millis)),
            _ => None,
        }
    }

    /// Returns true if the record carries exactly the given mark
    pub fn is_claimed_by(&self, mark: GenerationMark) -> bool {
        self.generation_mark() == Some(mark)
    }
}
