//! Storage traits and error types
//!
//! This module defines the sorted key-value interface the generator reads
//! crawl records through, and the associated error types.

use crate::record::CrawlRecord;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store is locked: {0} exists")]
    Locked(PathBuf),

    #[error("No crawl-state store at {0}")]
    MissingStore(PathBuf),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Callback invoked once per record during a scan
pub type RecordVisitor<'a> = dyn FnMut(String, CrawlRecord) -> StorageResult<()> + 'a;

/// A sorted, streamable source of crawl records
///
/// Implementations yield every record exactly once, in key order. There is
/// deliberately no point lookup: the generator only ever streams whole
/// inputs. An error returned by the visitor stops the scan and is passed
/// through unchanged.
pub trait RecordSource {
    /// Streams every (url, record) pair to `visit`
    fn scan(&self, visit: &mut RecordVisitor<'_>) -> StorageResult<()>;
}
