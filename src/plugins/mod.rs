//! Pluggable collaborator policies
//!
//! The generator consumes three kinds of policy, each behind a narrow trait:
//! - `UrlFilter`: may reject a URL outright
//! - `UrlNormalizer`: rewrites a URL into canonical form for a given scope
//! - `ScoringFilter`: adjusts the sort value a URL is selected by
//!
//! Implementations are looked up by name in a `PluginRegistry` once at
//! startup and passed to the generator as a resolved `Plugins` bundle.
//! Failures are reported as `PluginError` and never abort a run; every call
//! site decides its own fallback.

mod filters;
mod normalizers;
mod registry;
mod scoring;

pub use filters::DomainFilter;
pub use normalizers::BasicNormalizer;
pub use registry::PluginRegistry;
pub use scoring::OpicScoringFilter;

use crate::record::CrawlRecord;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by collaborator policies
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("URL filter '{name}' failed: {message}")]
    Filter { name: String, message: String },

    #[error("Malformed URL '{url}': {message}")]
    MalformedUrl { url: String, message: String },

    #[error("Scoring filter '{name}' failed: {message}")]
    Scoring { name: String, message: String },
}

/// Context a URL is being normalized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizerScope {
    /// General-purpose normalization
    Default,
    /// Canonicalizing a host for per-host counting during generation
    GenerateHostCount,
}

impl fmt::Display for NormalizerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::GenerateHostCount => write!(f, "generate_host_count"),
        }
    }
}

/// Accepts, rewrites or rejects URLs
pub trait UrlFilter: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the (possibly rewritten) URL, or None to reject it
    fn filter(&self, url: &str) -> Result<Option<String>, PluginError>;
}

/// Rewrites URLs into canonical form
pub trait UrlNormalizer: Send + Sync {
    fn name(&self) -> &str;

    fn normalize(&self, url: &str, scope: NormalizerScope) -> Result<String, PluginError>;
}

/// Contributes to the sort value a URL is selected by
pub trait ScoringFilter: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the adjusted sort value, given the value from earlier filters
    fn generator_sort_value(
        &self,
        url: &str,
        record: &CrawlRecord,
        init_sort: f32,
    ) -> Result<f32, PluginError>;
}

/// Ordered chain of URL filters; the first rejection wins
#[derive(Clone, Default)]
pub struct UrlFilters {
    filters: Vec<Arc<dyn UrlFilter>>,
}

impl UrlFilters {
    pub fn new(filters: Vec<Arc<dyn UrlFilter>>) -> Self {
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filter(&self, url: &str) -> Result<Option<String>, PluginError> {
        let mut current = url.to_string();
        for filter in &self.filters {
            match filter.filter(&current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

/// Ordered chain of URL normalizers, each fed the previous output
#[derive(Clone, Default)]
pub struct UrlNormalizers {
    normalizers: Vec<Arc<dyn UrlNormalizer>>,
}

impl UrlNormalizers {
    pub fn new(normalizers: Vec<Arc<dyn UrlNormalizer>>) -> Self {
        Self { normalizers }
    }

    pub fn len(&self) -> usize {
        self.normalizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalizers.is_empty()
    }

    pub fn normalize(&self, url: &str, scope: NormalizerScope) -> Result<String, PluginError> {
        let mut current = url.to_string();
        for normalizer in &self.normalizers {
            current = normalizer.normalize(&current, scope)?;
        }
        Ok(current)
    }
}

/// Ordered fold over scoring filters
#[derive(Clone, Default)]
pub struct ScoringFilters {
    filters: Vec<Arc<dyn ScoringFilter>>,
}

impl ScoringFilters {
    pub fn new(filters: Vec<Arc<dyn ScoringFilter>>) -> Self {
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn generator_sort_value(
        &self,
        url: &str,
        record: &CrawlRecord,
        init_sort: f32,
    ) -> Result<f32, PluginError> {
        let mut sort = init_sort;
        for filter in &self.filters {
            sort = filter.generator_sort_value(url, record, sort)?;
        }
        Ok(sort)
    }
}

/// The resolved collaborators one generator instance runs with
#[derive(Clone, Default)]
pub struct Plugins {
    pub filters: UrlFilters,
    pub normalizers: UrlNormalizers,
    pub scoring: ScoringFilters,
}
