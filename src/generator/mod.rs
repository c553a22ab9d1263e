//! Fetch-list generation
//!
//! This module turns a crawl-state store into a segment of fetch lists.
//!
//! # Stages
//!
//! - Selection (`selector`): picks due records by score, capped per partition
//!   and per host (`throttle`)
//! - Politeness partition (`partition`): regroups the picks by host into fetch
//!   lists ordered by URL hash
//! - Store update (`updater`): optionally writes the run's generation mark back
//!   into the store
//!
//! The `Generator` in `coordinator` runs the stages under the store lock.

mod coordinator;
pub mod partition;
pub mod runtime;
pub mod segment;
pub mod selector;
pub mod throttle;
pub mod updater;

pub use coordinator::Generator;
pub use partition::url_hash;
pub use segment::{next_segment_name, Segment};
pub use selector::{SelectorConfig, SelectorEntry};
pub use throttle::{
    bounded_lookup, HostDecision, HostResolver, HostThrottle, ResolveError, SystemResolver,
};
pub use updater::merge_claims;

use chrono::{DateTime, Utc};

/// Options of a single generate run
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Number of fetch lists; None uses the configured worker count
    pub num_lists: Option<usize>,

    /// Upper bound on selected URLs, split evenly across selection partitions
    pub top_n: u64,

    /// The instant records must be due by
    pub cur_time: DateTime<Utc>,

    /// Apply the URL filters
    pub filter: bool,

    /// Take over an existing store lock
    pub force: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            num_lists: None,
            top_n: u64::MAX,
            cur_time: Utc::now(),
            filter: true,
            force: false,
        }
    }
}
