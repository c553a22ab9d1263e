use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for the fetch-list generator
///
/// Every section and key is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generate: GenerateConfig,
    pub runtime: RuntimeConfig,
    pub plugins: PluginsConfig,
    #[serde(rename = "domain-filter")]
    pub domain_filter: DomainFilterConfig,
}

/// Selection policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    /// Maximum URLs per host admitted into one partition (<= 0 disables the throttle)
    #[serde(rename = "max-per-host")]
    pub max_per_host: i32,

    /// Count hosts by resolved IP address instead of host name
    #[serde(rename = "max-per-host-by-ip")]
    pub max_per_host_by_ip: bool,

    /// Write generation marks back into the crawl-state store
    #[serde(rename = "update-crawldb")]
    pub update_crawldb: bool,

    /// Days a claimed record stays in flight before it may be selected again
    #[serde(rename = "delay-days")]
    pub delay_days: u32,

    /// Whether URL filters apply by default
    pub filter: bool,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            max_per_host: -1,
            max_per_host_by_ip: false,
            update_crawldb: false,
            delay_days: 7,
            filter: true,
        }
    }
}

impl GenerateConfig {
    /// Returns the per-host cap if the throttle is enabled
    pub fn host_limit(&self) -> Option<usize> {
        usize::try_from(self.max_per_host).ok().filter(|&n| n > 0)
    }

    /// Returns the generation delay as a duration
    pub fn generation_delay(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.delay_days))
    }
}

/// Data-parallel runtime configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Default partition count; absent means available parallelism
    pub workers: Option<usize>,

    /// Partition count of the selection stage; absent means `workers`
    #[serde(rename = "reduce-tasks")]
    pub reduce_tasks: Option<usize>,

    /// Root directory for scratch areas; absent means the system temp dir
    #[serde(rename = "temp-dir")]
    pub temp_dir: Option<PathBuf>,

    /// Upper bound for a single DNS lookup (milliseconds)
    #[serde(rename = "dns-timeout-ms")]
    pub dns_timeout_ms: u64,

    /// Seed mixed into the host partitioner
    #[serde(rename = "partition-seed")]
    pub partition_seed: i32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: None,
            reduce_tasks: None,
            temp_dir: None,
            dns_timeout_ms: 5000,
            partition_seed: 0,
        }
    }
}

impl RuntimeConfig {
    /// Resolves the default partition count
    pub fn default_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Resolves the selection stage partition count
    pub fn selection_partitions(&self) -> usize {
        self.reduce_tasks.unwrap_or_else(|| self.default_workers())
    }
}

/// Ordered plugin names per collaborator kind
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    #[serde(rename = "url-filters")]
    pub url_filters: Vec<String>,

    #[serde(rename = "url-normalizers")]
    pub url_normalizers: Vec<String>,

    #[serde(rename = "scoring-filters")]
    pub scoring_filters: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            url_filters: vec!["domain".to_string()],
            url_normalizers: vec!["basic".to_string()],
            scoring_filters: vec!["opic".to_string()],
        }
    }
}

/// Host patterns for the built-in domain filter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomainFilterConfig {
    /// Patterns (e.g. "example.com" or "*.example.com") a host must match; empty allows all
    pub allow: Vec<String>,

    /// Patterns whose hosts are always rejected
    pub deny: Vec<String>,
}
