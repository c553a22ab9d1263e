//! Store update stage
//!
//! Writes the generation marks of this run's selected records back into the
//! crawl-state store, so a later run treats them as in flight until they have
//! been fetched or the generation delay has passed.

use crate::record::{CrawlRecord, GenerationMark};
use crate::storage::{CrawlDb, CrawlDbWriter, PartSet, RecordSource, CURRENT_NAME};
use crate::Result;
use std::collections::HashMap;

/// Prefix of the scratch directory created inside the store while updating
const UPDATE_SCRATCH_PREFIX: &str = ".generate-update-";

/// Reduces every version of one URL's record to the one to keep
///
/// The kept record is the first one that does not carry `mark`, falling back
/// to a marked one if that is all there is. If any version carries `mark`,
/// the kept record is stamped with it. Marks of other runs are never adopted.
pub fn merge_claims<I>(mark: GenerationMark, versions: I) -> Option<CrawlRecord>
where
    I: IntoIterator<Item = CrawlRecord>,
{
    let mut original: Option<CrawlRecord> = None;
    let mut fallback: Option<CrawlRecord> = None;
    let mut claimed = false;

    for version in versions {
        if version.is_claimed_by(mark) {
            claimed = true;
            if fallback.is_none() {
                fallback = Some(version);
            }
        } else if original.is_none() {
            original = Some(version);
        }
    }

    let mut kept = original.or(fallback)?;
    if claimed {
        kept.set_generation_mark(mark);
    }
    Some(kept)
}

/// Merges the selection output into the store and installs the result
///
/// The new version is written into a scratch directory inside the store, so
/// installing it is a rename on the same filesystem. The scratch directory is
/// removed whether or not the update succeeds.
///
/// # Returns
///
/// The number of records in the installed version
pub fn run_update(store: CrawlDb, selection: &PartSet, mark: GenerationMark) -> Result<u64> {
    tracing::info!("Updating crawl-state store {}", store.dir().display());

    let mut claims: HashMap<String, CrawlRecord> = HashMap::new();
    selection.scan_entries(&mut |entry| {
        claims.insert(entry.url, entry.record);
        Ok(())
    })?;

    let scratch = tempfile::Builder::new()
        .prefix(UPDATE_SCRATCH_PREFIX)
        .tempdir_in(store.dir())?;
    let new_version = scratch.path().join(CURRENT_NAME);

    let mut writer = CrawlDbWriter::create(&new_version)?;
    store.scan(&mut |url: String, record: CrawlRecord| {
        let claim = claims.remove(&url);
        if let Some(merged) = merge_claims(mark, std::iter::once(record).chain(claim)) {
            writer.put(&url, &merged)?;
        }
        Ok(())
    })?;

    // Claims for URLs the store no longer holds are written as they are.
    let mut orphans: Vec<(String, CrawlRecord)> = claims.into_iter().collect();
    orphans.sort_by(|a, b| a.0.cmp(&b.0));
    for (url, record) in orphans {
        if let Some(merged) = merge_claims(mark, std::iter::once(record)) {
            writer.put(&url, &merged)?;
        }
    }

    let written = writer.finish()?;
    store.install(&new_version)?;
    scratch.close()?;

    tracing::info!("Crawl-state store updated ({} records)", written);
    Ok(written)
}
