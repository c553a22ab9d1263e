//! Selection stage
//!
//! Streams the crawl-state store, keeps the records that are due, scores
//! them, groups them by host into selection partitions and lets one worker
//! per partition take the best-scored entries up to the per-partition limit.
//! Each worker writes its picks, in decreasing score order, to one part file
//! of the scratch area.

use crate::generator::runtime::{partition_by, partition_for_url, run_partitions};
use crate::generator::throttle::{HostDecision, HostResolver, HostThrottle};
use crate::plugins::Plugins;
use crate::record::{CrawlRecord, GenerationMark};
use crate::storage::{part_file_name, PartWriter, RecordSource};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sort value every URL starts from before scoring
pub const INITIAL_SORT_VALUE: f32 = 1.0;

/// Per-run settings of the selection stage
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub cur_time: DateTime<Utc>,
    pub mark: GenerationMark,
    pub generation_delay: Duration,
    pub apply_filter: bool,
    pub top_n: u64,
    pub partitions: usize,
    pub partition_seed: i32,
    pub max_per_host: Option<usize>,
    pub by_ip: bool,
}

impl SelectorConfig {
    /// Entries each partition may admit before it stops consuming input
    pub fn limit(&self) -> u64 {
        self.top_n / self.partitions.max(1) as u64
    }
}

/// A candidate URL with the value it is ordered by
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorEntry {
    pub url: String,
    pub record: CrawlRecord,
    pub sort_score: f32,
}

/// Applies the admission tests to one store record
///
/// Returns the entry to emit, carrying a copy of the record stamped with the
/// run's generation mark, or None if the record is not due.
pub fn select_candidate(
    url: &str,
    record: &CrawlRecord,
    config: &SelectorConfig,
    plugins: &Plugins,
) -> Option<SelectorEntry> {
    if config.apply_filter {
        match plugins.filters.filter(url) {
            Ok(Some(_)) => {}
            Ok(None) => return None,
            Err(e) => tracing::warn!("Couldn't filter url: {} ({})", url, e),
        }
    }

    if !record.status.is_selectable() {
        return None;
    }

    if record.fetch_time > config.cur_time {
        return None;
    }

    if let Some(prior) = record.generation_mark() {
        let in_flight_until = prior
            .to_datetime()
            .checked_add_signed(config.generation_delay);
        if in_flight_until.map_or(true, |until| until > config.cur_time) {
            return None;
        }
    }

    let sort_score = match plugins
        .scoring
        .generator_sort_value(url, record, INITIAL_SORT_VALUE)
    {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Couldn't compute sort value for {}, using default: {}", url, e);
            INITIAL_SORT_VALUE
        }
    };

    let mut claimed = record.clone();
    claimed.set_generation_mark(config.mark);

    Some(SelectorEntry {
        url: url.to_string(),
        record: claimed,
        sort_score,
    })
}

/// Scans `source` and returns the candidates of each partition, best first
///
/// Entries with equal sort values keep the order `source` produced them in.
pub fn collect_candidates(
    source: &dyn RecordSource,
    config: &SelectorConfig,
    plugins: &Plugins,
) -> Result<Vec<Vec<SelectorEntry>>> {
    let mut candidates = Vec::new();
    let mut scanned = 0u64;
    source.scan(&mut |url: String, record: CrawlRecord| {
        scanned += 1;
        if let Some(entry) = select_candidate(&url, &record, config, plugins) {
            candidates.push(entry);
        }
        Ok(())
    })?;

    tracing::debug!("Scanned {} records, {} candidates", scanned, candidates.len());

    let mut buckets = partition_by(candidates, config.partitions, |entry| {
        partition_for_url(&entry.url, config.partition_seed, config.partitions)
    });
    for bucket in &mut buckets {
        bucket.sort_by(|a, b| b.sort_score.total_cmp(&a.sort_score));
    }
    Ok(buckets)
}

/// Consumes one partition's candidates, best first, and writes the admitted ones
///
/// Stops after `limit` admissions. Candidates rejected by the throttle do
/// not count towards the limit.
pub async fn reduce_partition(
    entries: Vec<SelectorEntry>,
    limit: u64,
    mut throttle: Option<HostThrottle>,
    output: &Path,
) -> Result<u64> {
    let mut writer = PartWriter::create(output)?;
    let mut count = 0u64;

    for entry in entries {
        if count >= limit {
            break;
        }

        if let Some(throttle) = throttle.as_mut() {
            match throttle.admit(&entry.url).await {
                HostDecision::Admit(_) => {}
                decision => {
                    tracing::trace!("Skipping {}: {:?}", entry.url, decision);
                    continue;
                }
            }
        }

        writer.append(&entry.url, &entry.record, Some(entry.sort_score))?;
        count += 1;
    }

    writer.finish()?;
    Ok(count)
}

/// Runs the per-partition workers of the selection stage into `output_dir`
///
/// `candidates` holds one best-first list per partition, as produced by
/// `collect_candidates`.
///
/// # Returns
///
/// The number of entries selected per partition, in partition order
pub async fn run_selection(
    candidates: Vec<Vec<SelectorEntry>>,
    output_dir: &Path,
    config: &SelectorConfig,
    plugins: &Plugins,
    resolver: Arc<dyn HostResolver>,
) -> Result<Vec<u64>> {
    let limit = config.limit();
    tracing::info!(
        "Selecting best-scoring urls due for fetch (partitions: {}, limit per partition: {})",
        candidates.len(),
        limit
    );

    let inputs: Vec<(Vec<SelectorEntry>, PathBuf)> = candidates
        .into_iter()
        .enumerate()
        .map(|(index, bucket)| (bucket, output_dir.join(part_file_name(index))))
        .collect();

    let counts = run_partitions(inputs, |_, (bucket, path)| {
        let throttle = config.max_per_host.map(|max| {
            HostThrottle::new(
                max,
                config.by_ip,
                Arc::clone(&resolver),
                plugins.normalizers.clone(),
            )
        });
        async move { reduce_partition(bucket, limit, throttle, &path).await }
    })
    .await?;

    tracing::info!("Selected {} records", counts.iter().sum::<u64>());
    Ok(counts)
}
