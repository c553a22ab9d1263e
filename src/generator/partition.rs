//! Politeness partition stage
//!
//! Re-partitions the selection output by host into the fetch lists of a
//! segment and orders every list by a hash of the URL bytes, so that URLs of
//! one host are spread out instead of being fetched in a burst.

use crate::generator::runtime::{partition_by, partition_for_url, run_partitions};
use crate::storage::{part_file_name, PartEntry, PartSet, PartWriter};
use crate::Result;
use std::path::{Path, PathBuf};

/// Hash the fetch lists are ordered by
///
/// Starts at 1 and folds the URL's bytes from last to first as
/// `hash = 31 * hash + byte`, reading each byte as signed.
pub fn url_hash(url: &str) -> i32 {
    url.as_bytes()
        .iter()
        .rev()
        .fold(1i32, |hash, &byte| {
            hash.wrapping_mul(31).wrapping_add(i32::from(byte as i8))
        })
}

/// Sorts one fetch list in place by URL hash, then URL
pub fn sort_fetch_list(entries: &mut [PartEntry]) {
    entries.sort_by_cached_key(|entry| (url_hash(&entry.url), entry.url.clone()));
}

fn write_fetch_list(mut entries: Vec<PartEntry>, output: &Path) -> Result<u64> {
    sort_fetch_list(&mut entries);

    let mut writer = PartWriter::create(output)?;
    for entry in &entries {
        writer.append(&entry.url, &entry.record, None)?;
    }
    Ok(writer.finish()?)
}

/// Runs the partition stage from the selection output into `output_dir`
///
/// Writes `num_lists` part files, some of which may be empty.
///
/// # Returns
///
/// The number of entries written per fetch list, in list order
pub async fn run_partition(
    selection: &PartSet,
    output_dir: &Path,
    num_lists: usize,
    partition_seed: i32,
) -> Result<Vec<u64>> {
    tracing::info!("Partitioning selected urls by host, for politeness ({} lists)", num_lists);

    let mut entries = Vec::new();
    selection.scan_entries(&mut |entry| {
        entries.push(entry);
        Ok(())
    })?;

    let lists = partition_by(entries, num_lists, |entry| {
        partition_for_url(&entry.url, partition_seed, num_lists)
    });
    let inputs: Vec<(Vec<PartEntry>, PathBuf)> = lists
        .into_iter()
        .enumerate()
        .map(|(index, list)| (list, output_dir.join(part_file_name(index))))
        .collect();

    let counts = run_partitions(inputs, |_, (list, path)| async move {
        write_fetch_list(list, &path)
    })
    .await?;

    tracing::info!(
        "Wrote {} urls to {} fetch lists",
        counts.iter().sum::<u64>(),
        counts.len()
    );
    Ok(counts)
}
