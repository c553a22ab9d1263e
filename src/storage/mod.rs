//! Storage module for crawl state and stage outputs
//!
//! This module handles all on-disk state the generator touches:
//! - The crawl-state store (SQLite, one file per version, atomic install)
//! - Part files written by partition workers (scratch areas and segments)
//! - The exclusive store lock

mod lock;
mod schema;
mod sqlite;
mod traits;

pub use lock::{StoreLock, LOCK_NAME};
pub use sqlite::{
    part_file_name, CrawlDb, CrawlDbWriter, PartEntry, PartReader, PartSet, PartWriter,
    CURRENT_NAME,
};
pub use traits::{RecordSource, RecordVisitor, StorageError, StorageResult};
