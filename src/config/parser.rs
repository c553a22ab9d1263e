use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use fetchlist_generator::config::load_config;
///
/// let config = load_config(Path::new("generate.toml")).unwrap();
/// println!("Delay: {} days", config.generate.delay_days);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is logged at startup and written into the store lock marker so
/// a stale lock can be traced back to the run that left it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let config_content = r#"
[generate]
max-per-host = 50
max-per-host-by-ip = true
update-crawldb = true
delay-days = 3
filter = false

[runtime]
workers = 8
reduce-tasks = 2
temp-dir = "/var/tmp/generate"
dns-timeout-ms = 250
partition-seed = 17

[plugins]
url-filters = ["domain"]
url-normalizers = ["basic"]
scoring-filters = ["opic"]

[domain-filter]
allow = ["*.example.com"]
deny = ["ads.example.com"]
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.generate.max_per_host, 50);
        assert!(config.generate.max_per_host_by_ip);
        assert!(config.generate.update_crawldb);
        assert_eq!(config.generate.delay_days, 3);
        assert!(!config.generate.filter);
        assert_eq!(config.runtime.workers, Some(8));
        assert_eq!(config.runtime.selection_partitions(), 2);
        assert_eq!(config.runtime.dns_timeout_ms, 250);
        assert_eq!(config.runtime.partition_seed, 17);
        assert_eq!(config.domain_filter.allow, vec!["*.example.com"]);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.generate.max_per_host, -1);
        assert_eq!(config.generate.host_limit(), None);
        assert_eq!(config.generate.delay_days, 7);
        assert!(config.generate.filter);
        assert!(!config.generate.update_crawldb);
        assert_eq!(config.plugins.scoring_filters, vec!["opic"]);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/generate.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config("[runtime]\nworkers = 0\n");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_config_hash_is_stable() {
        let file = create_temp_config("[generate]\ndelay-days = 1\n");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let (_, hash2) = load_config_with_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(hash_content("content 1"), hash_content("content 2"));
    }
}
