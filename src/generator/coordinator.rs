//! Generation coordinator
//!
//! Owns one generate run end to end: the store lock, the scratch areas, the
//! three stages and cleanup on every exit path.

use crate::config::Config;
use crate::generator::partition::run_partition;
use crate::generator::segment::{create_segment, Segment};
use crate::generator::selector::{collect_candidates, run_selection, SelectorConfig};
use crate::generator::throttle::{HostResolver, SystemResolver};
use crate::generator::updater::run_update;
use crate::generator::GenerateOptions;
use crate::plugins::Plugins;
use crate::record::GenerationMark;
use crate::storage::{CrawlDb, PartSet, StorageError, StoreLock};
use crate::{GeneratorError, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Prefix of the selection scratch directory
const SELECTION_SCRATCH_PREFIX: &str = "generate-temp-";

/// Generates fetch lists from a crawl-state store
pub struct Generator {
    config: Arc<Config>,
    plugins: Plugins,
    resolver: Arc<dyn HostResolver>,
    config_hash: Option<String>,
}

impl Generator {
    /// Creates a generator resolving hosts through the operating system
    pub fn new(config: Config, plugins: Plugins) -> Self {
        let timeout = Duration::from_millis(config.runtime.dns_timeout_ms);
        Self {
            config: Arc::new(config),
            plugins,
            resolver: Arc::new(SystemResolver::new(timeout)),
            config_hash: None,
        }
    }

    /// Replaces the host resolver used in by-IP mode
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Records the configuration hash in the lock marker of every run
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one generation
    ///
    /// # Arguments
    ///
    /// * `store_dir` - The crawl-state store
    /// * `segments_dir` - Directory new segments are created in
    /// * `options` - Per-run options
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Segment))` - A segment was written
    /// * `Ok(None)` - No URL was due for fetching; nothing was written
    /// * `Err(GeneratorError)` - The run failed; the lock is released and
    ///   scratch areas are removed
    pub async fn generate(
        &self,
        store_dir: &Path,
        segments_dir: &Path,
        options: GenerateOptions,
    ) -> Result<Option<Segment>> {
        let owner = format!(
            "fetchlist-generator config={}",
            self.config_hash.as_deref().unwrap_or("-")
        );
        if !store_dir.is_dir() {
            return Err(StorageError::MissingStore(store_dir.to_path_buf()).into());
        }
        let lock = StoreLock::acquire(store_dir, options.force, &owner)?;
        tracing::info!("Locked crawl-state store {}", store_dir.display());

        let outcome = self.run(store_dir, segments_dir, &options).await;

        match lock.release() {
            Ok(()) => tracing::debug!("Released crawl-state store {}", store_dir.display()),
            Err(e) => {
                tracing::error!("Failed to release lock of {}: {}", store_dir.display(), e);
                if outcome.is_ok() {
                    return Err(e.into());
                }
            }
        }

        outcome
    }

    async fn run(
        &self,
        store_dir: &Path,
        segments_dir: &Path,
        options: &GenerateOptions,
    ) -> Result<Option<Segment>> {
        let num_lists = match options.num_lists {
            Some(0) => {
                return Err(GeneratorError::InvalidArgument(
                    "number of fetch lists must be at least 1".to_string(),
                ))
            }
            Some(n) => n,
            None => self.config.runtime.default_workers(),
        };

        let mark = GenerationMark::now();
        let selector_config = SelectorConfig {
            cur_time: options.cur_time,
            mark,
            generation_delay: self.config.generate.generation_delay(),
            apply_filter: options.filter,
            top_n: options.top_n,
            partitions: self.config.runtime.selection_partitions().max(1),
            partition_seed: self.config.runtime.partition_seed,
            max_per_host: self.config.generate.host_limit(),
            by_ip: self.config.generate.max_per_host_by_ip,
        };

        tracing::info!("Generator: starting (mark {})", mark);
        tracing::info!("Generator: current time {}", options.cur_time.to_rfc3339());
        if options.filter {
            tracing::info!("Generator: filtering enabled");
        }
        if options.top_n != u64::MAX {
            tracing::info!("Generator: topN {}", options.top_n);
        }

        let store = CrawlDb::open(store_dir)?;
        let scratch = self.scratch_dir()?;

        let candidates = collect_candidates(&store, &selector_config, &self.plugins)?;
        run_selection(
            candidates,
            scratch.path(),
            &selector_config,
            &self.plugins,
            Arc::clone(&self.resolver),
        )
        .await?;

        let selection = PartSet::open(scratch.path())?;
        if selection.is_empty()? {
            tracing::warn!("Generator: 0 records selected for fetching, exiting");
            return Ok(None);
        }

        let segment = create_segment(segments_dir).await?;
        let partitioned = run_partition(
            &selection,
            &segment.fetch_list_dir(),
            num_lists,
            self.config.runtime.partition_seed,
        )
        .await;
        if let Err(e) = partitioned {
            if let Err(cleanup) = std::fs::remove_dir_all(segment.path()) {
                tracing::warn!(
                    "Failed to remove partial segment {}: {}",
                    segment.path().display(),
                    cleanup
                );
            }
            return Err(e);
        }

        if self.config.generate.update_crawldb {
            run_update(store, &selection, mark)?;
        }

        scratch.close()?;
        tracing::info!("Generator: done, segment {}", segment.name());
        Ok(Some(segment))
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SELECTION_SCRATCH_PREFIX);
        let dir = match &self.config.runtime.temp_dir {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        tracing::debug!("Using scratch area {}", dir.path().display());
        Ok(dir)
    }
}
