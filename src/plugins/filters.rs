use crate::config::DomainFilterConfig;
use crate::plugins::{PluginError, UrlFilter};
use url::Url;

/// Filters URLs by host against allow and deny wildcard patterns
///
/// Deny patterns win over allow patterns. An empty allow list admits every
/// host that is not denied. URLs without a host are rejected.
#[derive(Debug, Clone, Default)]
pub struct DomainFilter {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl DomainFilter {
    /// Creates a filter; patterns are matched case-insensitively
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self {
            allow: lowercase_all(allow),
            deny: lowercase_all(deny),
        }
    }

    pub fn from_config(config: &DomainFilterConfig) -> Self {
        Self::new(config.allow.clone(), config.deny.clone())
    }

    fn admits(&self, host: &str) -> bool {
        if self.deny.iter().any(|p| matches_wildcard(p, host)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|p| matches_wildcard(p, host))
    }
}

impl UrlFilter for DomainFilter {
    fn name(&self) -> &str {
        "domain"
    }

    fn filter(&self, url: &str) -> Result<Option<String>, PluginError> {
        let parsed = Url::parse(url).map_err(|e| PluginError::Filter {
            name: self.name().to_string(),
            message: format!("{}: {}", url, e),
        })?;

        let Some(host) = parsed.host_str() else {
            return Ok(None);
        };

        if self.admits(&host.to_lowercase()) {
            Ok(Some(url.to_string()))
        } else {
            Ok(None)
        }
    }
}

fn lowercase_all(patterns: Vec<String>) -> Vec<String> {
    patterns.into_iter().map(|p| p.to_lowercase()).collect()
}

/// Checks a lower-case host against a lower-case pattern
///
/// "example.com" matches only itself; "*.example.com" matches the bare
/// domain and any subdomain of it.
fn matches_wildcard(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            host == base
                || host
                    .strip_suffix(base)
                    .map_or(false, |rest| rest.ends_with('.'))
        }
        None => host == pattern,
    }
}
