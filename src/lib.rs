//! Fetch-list generator for a web crawler
//!
//! This crate selects the next batch of URLs to fetch from a crawl-state store,
//! throttles them per host, orders them for polite fetching and writes them out
//! as an immutable segment, optionally marking the selected records in the store
//! so they are not selected again while in flight.

pub mod config;
pub mod generator;
pub mod plugins;
pub mod record;
pub mod storage;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for generator operations
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Partition worker failed: {0}")]
    Worker(String),

    #[error("Segment already exists: {0}")]
    SegmentExists(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Unknown {kind} plugin '{name}'")]
    UnknownPlugin { kind: String, name: String },
}

/// Result type alias for generator operations
pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use generator::{GenerateOptions, Generator, Segment};
pub use plugins::{PluginRegistry, Plugins};
pub use record::{CrawlRecord, CrawlStatus, GenerationMark};
