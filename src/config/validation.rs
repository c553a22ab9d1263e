use crate::config::types::{Config, DomainFilterConfig, PluginsConfig, RuntimeConfig};
use crate::ConfigError;

/// Validates the entire configuration
///
/// Plugin names are only checked for shape here; whether they resolve is
/// decided by the registry the caller builds.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_runtime_config(&config.runtime)?;
    validate_plugins_config(&config.plugins)?;
    validate_domain_filter(&config.domain_filter)?;
    Ok(())
}

fn validate_runtime_config(config: &RuntimeConfig) -> Result<(), ConfigError> {
    if config.workers == Some(0) {
        return Err(ConfigError::Validation(
            "workers must be >= 1".to_string(),
        ));
    }

    if config.reduce_tasks == Some(0) {
        return Err(ConfigError::Validation(
            "reduce-tasks must be >= 1".to_string(),
        ));
    }

    if config.dns_timeout_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "dns-timeout-ms must be >= 1, got {}",
            config.dns_timeout_ms
        )));
    }

    Ok(())
}

fn validate_plugins_config(config: &PluginsConfig) -> Result<(), ConfigError> {
    if config.scoring_filters.is_empty() {
        return Err(ConfigError::Validation(
            "at least one scoring filter is required".to_string(),
        ));
    }

    let all_names = config
        .url_filters
        .iter()
        .chain(&config.url_normalizers)
        .chain(&config.scoring_filters);
    for name in all_names {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "plugin names cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_domain_filter(config: &DomainFilterConfig) -> Result<(), ConfigError> {
    for pattern in config.allow.iter().chain(&config.deny) {
        validate_domain_pattern(pattern)?;
    }
    Ok(())
}

/// Validates a host pattern (supports a leading "*." wildcard)
pub fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain pattern '{}' is empty",
            pattern
        )));
    }

    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with(['.', '-']) || domain.ends_with(['.', '-']) {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if domain.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must be lower-case",
            domain
        )));
    }

    Ok(())
}
