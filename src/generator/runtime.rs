//! In-process data-parallel runtime
//!
//! Stages are expressed as a partitioning step followed by independent
//! per-partition workers. Workers run as tokio tasks and never talk to each
//! other; their results are reassembled in partition order.

use crate::{GeneratorError, Result};
use std::future::Future;
use tokio::task::JoinSet;
use url::Url;

/// Returns the lower-cased host of `url`, if it has one
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// 31-based string hash over UTF-16 code units
fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Assigns a URL to one of `partitions` partitions by its host
///
/// All URLs of one host land in the same partition. URLs without a parsable
/// host are spread by their full text instead.
pub fn partition_for_url(url: &str, seed: i32, partitions: usize) -> usize {
    if partitions <= 1 {
        return 0;
    }
    let hash = match host_of(url) {
        Some(host) => string_hash(&host),
        None => string_hash(url),
    };
    ((hash ^ seed) & i32::MAX) as usize % partitions
}

/// Splits items into `partitions` buckets, keeping input order within a bucket
pub fn partition_by<T, F>(items: impl IntoIterator<Item = T>, partitions: usize, key: F) -> Vec<Vec<T>>
where
    F: Fn(&T) -> usize,
{
    let mut buckets: Vec<Vec<T>> = (0..partitions.max(1)).map(|_| Vec::new()).collect();
    let last = buckets.len() - 1;
    for item in items {
        let index = key(&item).min(last);
        buckets[index].push(item);
    }
    buckets
}

/// Runs one worker per input concurrently and returns their outputs in input order
///
/// The first failing worker aborts the remaining ones and its error is
/// returned. A worker that panics is reported as `GeneratorError::Worker`.
pub async fn run_partitions<I, T, F, Fut>(inputs: Vec<I>, worker: F) -> Result<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(usize, I) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let total = inputs.len();
    let mut set = JoinSet::new();
    for (index, input) in inputs.into_iter().enumerate() {
        let task = worker(index, input);
        set.spawn(async move { (index, task.await) });
    }

    let mut outputs: Vec<Option<T>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, result) = joined.map_err(|e| GeneratorError::Worker(e.to_string()))?;
        outputs[index] = Some(result?);
    }

    outputs
        .into_iter()
        .enumerate()
        .map(|(index, output)| {
            output.ok_or_else(|| GeneratorError::Worker(format!("partition {} produced no result", index)))
        })
        .collect()
}
