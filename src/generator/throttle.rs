//! Per-partition host admission control
//!
//! A `HostThrottle` is owned by exactly one selection worker. Its counters
//! only see the candidates of that worker's partition, so the per-host cap is
//! a partition-local bound and not a global one.

use crate::plugins::{NormalizerScope, UrlNormalizers};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// DNS failures between two warnings
const DNS_FAILURE_WARN_EVERY: u64 = 1000;

/// Errors raised while resolving a host name
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No address found for {0}")]
    NotFound(String),

    #[error("Lookup of {0} timed out")]
    Timeout(String),

    #[error("Lookup failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves host names to addresses
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError>;
}

/// Resolver backed by the operating system, bounded by a timeout
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
        bounded_lookup(host, self.timeout, tokio::net::lookup_host((host, 0))).await
    }
}

/// Awaits an address lookup for at most `timeout` and takes its first address
pub async fn bounded_lookup<F, I>(
    host: &str,
    timeout: Duration,
    lookup: F,
) -> Result<IpAddr, ResolveError>
where
    F: Future<Output = std::io::Result<I>>,
    I: Iterator<Item = SocketAddr>,
{
    let mut addrs = tokio::time::timeout(timeout, lookup)
        .await
        .map_err(|_| ResolveError::Timeout(host.to_string()))??;

    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ResolveError::NotFound(host.to_string()))
}

/// Outcome of offering one candidate URL to the throttle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostDecision {
    /// Admitted; carries the canonical host it was counted against
    Admit(String),
    /// The URL has no parsable host
    UnknownHost,
    /// The host could not be resolved in by-IP mode
    DnsFailure,
    /// The canonical URL could not be normalized
    Malformed,
    /// The host already used up its quota in this partition
    OverLimit(String),
}

impl HostDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, HostDecision::Admit(_))
    }
}

/// Caps the number of URLs admitted per host within one partition
pub struct HostThrottle {
    max_per_host: usize,
    by_ip: bool,
    counts: HashMap<String, usize>,
    dns_failures: u64,
    resolver: Arc<dyn HostResolver>,
    normalizers: UrlNormalizers,
}

impl HostThrottle {
    pub fn new(
        max_per_host: usize,
        by_ip: bool,
        resolver: Arc<dyn HostResolver>,
        normalizers: UrlNormalizers,
    ) -> Self {
        Self {
            max_per_host,
            by_ip,
            counts: HashMap::new(),
            dns_failures: 0,
            resolver,
            normalizers,
        }
    }

    /// Number of failed DNS lookups seen so far
    pub fn dns_failures(&self) -> u64 {
        self.dns_failures
    }

    /// Number of admission attempts counted against `host`
    pub fn attempts(&self, host: &str) -> usize {
        self.counts.get(host).copied().unwrap_or(0)
    }

    /// Offers a candidate URL
    ///
    /// Every candidate that reaches the counting step increments its host's
    /// counter, including candidates that end up over the limit.
    pub async fn admit(&mut self, url: &str) -> HostDecision {
        let Ok(mut parsed) = Url::parse(url) else {
            return HostDecision::UnknownHost;
        };
        let Some(host) = parsed.host_str().map(|h| h.to_lowercase()) else {
            return HostDecision::UnknownHost;
        };

        if self.by_ip {
            let ip = match self.resolver.resolve(trim_brackets(&host)).await {
                Ok(ip) => ip,
                Err(e) => {
                    self.record_dns_failure(&host, &e);
                    return HostDecision::DnsFailure;
                }
            };
            if parsed.set_ip_host(ip).is_err() {
                tracing::warn!("Malformed URL: '{}', skipping", url);
                return HostDecision::Malformed;
            }
        } else if parsed.set_host(Some(&host)).is_err() {
            tracing::warn!("Malformed URL: '{}', skipping", url);
            return HostDecision::Malformed;
        }

        let canonical = match self
            .normalizers
            .normalize(parsed.as_str(), NormalizerScope::GenerateHostCount)
        {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::warn!("Malformed URL: '{}', skipping ({})", parsed, e);
                return HostDecision::Malformed;
            }
        };
        let Some(key) = Url::parse(&canonical)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
        else {
            tracing::warn!("Malformed URL: '{}', skipping", canonical);
            return HostDecision::Malformed;
        };

        let count = self.counts.entry(key.clone()).or_insert(0);
        *count += 1;

        if *count > self.max_per_host {
            if *count == self.max_per_host + 1 {
                tracing::info!("Host {} has more than {} URLs", key, self.max_per_host);
            }
            return HostDecision::OverLimit(key);
        }

        HostDecision::Admit(key)
    }

    fn record_dns_failure(&mut self, host: &str, error: &ResolveError) {
        self.dns_failures += 1;
        if self.dns_failures % DNS_FAILURE_WARN_EVERY == 0 {
            tracing::warn!(
                "DNS lookup failed for {}: {} ({} failures so far)",
                host,
                error,
                self.dns_failures
            );
        } else {
            tracing::debug!("DNS lookup failed for {}: {}", host, error);
        }
    }
}

fn trim_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::BasicNormalizer;
    use std::net::Ipv4Addr;

    /// Resolves from a fixed table; unknown names fail
    struct TableResolver(HashMap<String, IpAddr>);

    #[async_trait]
    impl HostResolver for TableResolver {
        async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
            self.0
                .get(host)
                .copied()
                .ok_or_else(|| ResolveError::NotFound(host.to_string()))
        }
    }

    fn table(entries: &[(&str, [u8; 4])]) -> Arc<dyn HostResolver> {
        Arc::new(TableResolver(
            entries
                .iter()
                .map(|(h, ip)| (h.to_string(), IpAddr::V4(Ipv4Addr::from(*ip))))
                .collect(),
        ))
    }

    fn throttle(max: usize, by_ip: bool, resolver: Arc<dyn HostResolver>) -> HostThrottle {
        let normalizers = UrlNormalizers::new(vec![Arc::new(BasicNormalizer::new())]);
        HostThrottle::new(max, by_ip, resolver, normalizers)
    }

    #[tokio::test]
    async fn test_caps_urls_per_host() {
        let mut t = throttle(2, false, table(&[]));
        let mut admitted = 0;
        for i in 0..5 {
            if t.admit(&format!("http://example.com/{}", i)).await.is_admitted() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 2);
        assert_eq!(t.attempts("example.com"), 5);
    }

    #[tokio::test]
    async fn test_hosts_are_counted_separately() {
        let mut t = throttle(1, false, table(&[]));
        assert!(t.admit("http://a.com/1").await.is_admitted());
        assert!(t.admit("http://b.com/1").await.is_admitted());
        assert_eq!(
            t.admit("http://a.com/2").await,
            HostDecision::OverLimit("a.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_host_case_and_www_share_budget() {
        let mut t = throttle(1, false, table(&[]));
        assert!(t.admit("http://Example.com/1").await.is_admitted());
        assert!(!t.admit("http://www.example.com/2").await.is_admitted());
    }

    #[tokio::test]
    async fn test_unknown_host_is_skipped() {
        let mut t = throttle(1, false, table(&[]));
        assert_eq!(t.admit("not a url").await, HostDecision::UnknownHost);
        assert_eq!(t.admit("mailto:x@y.z").await, HostDecision::UnknownHost);
    }

    #[tokio::test]
    async fn test_by_ip_groups_hosts_on_one_address() {
        let resolver = table(&[("a.com", [10, 0, 0, 1]), ("b.com", [10, 0, 0, 1])]);
        let mut t = throttle(1, true, resolver);

        assert_eq!(
            t.admit("http://a.com/").await,
            HostDecision::Admit("10.0.0.1".to_string())
        );
        assert_eq!(
            t.admit("http://b.com/").await,
            HostDecision::OverLimit("10.0.0.1".to_string())
        );
    }

    #[tokio::test]
    async fn test_dns_failure_does_not_consume_quota() {
        let resolver = table(&[("good.com", [10, 0, 0, 2])]);
        let mut t = throttle(1, true, resolver);

        assert_eq!(t.admit("http://bad.com/").await, HostDecision::DnsFailure);
        assert_eq!(t.admit("http://bad.com/again").await, HostDecision::DnsFailure);
        assert_eq!(t.dns_failures(), 2);
        assert!(t.admit("http://good.com/").await.is_admitted());
    }

    /// Answers only after its lookup outlives the timeout
    struct StalledResolver {
        timeout: Duration,
    }

    #[async_trait]
    impl HostResolver for StalledResolver {
        async fn resolve(&self, host: &str) -> Result<IpAddr, ResolveError> {
            let stalled = async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vec![SocketAddr::from(([10, 0, 0, 9], 0))].into_iter())
            };
            bounded_lookup(host, self.timeout, stalled).await
        }
    }

    #[tokio::test]
    async fn test_bounded_lookup_times_out() {
        let stalled = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(std::iter::empty::<SocketAddr>())
        };
        let result = bounded_lookup("slow.com", Duration::from_millis(20), stalled).await;
        assert!(matches!(result, Err(ResolveError::Timeout(h)) if h == "slow.com"));
    }

    #[tokio::test]
    async fn test_bounded_lookup_without_addresses() {
        let empty = async { Ok(std::iter::empty::<SocketAddr>()) };
        let result = bounded_lookup("none.com", Duration::from_secs(1), empty).await;
        assert!(matches!(result, Err(ResolveError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_lookup_timeout_counts_as_dns_failure() {
        let resolver = Arc::new(StalledResolver {
            timeout: Duration::from_millis(20),
        });
        let mut t = throttle(1, true, resolver);

        assert_eq!(t.admit("http://slow.com/").await, HostDecision::DnsFailure);
        assert_eq!(t.dns_failures(), 1);
        assert_eq!(t.attempts("slow.com"), 0);
    }

    #[tokio::test]
    async fn test_system_resolver_resolves_ip_literal() {
        let resolver = SystemResolver::new(Duration::from_secs(5));
        let ip = resolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
