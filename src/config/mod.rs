//! Configuration module for the fetch-list generator
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use fetchlist_generator::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("generate.toml")).unwrap();
//! println!("Per-host cap: {}", config.generate.max_per_host);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DomainFilterConfig, GenerateConfig, PluginsConfig, RuntimeConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate_domain_pattern;
