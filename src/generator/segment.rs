//! Segment naming and creation
//!
//! Segment names are UTC timestamps with second granularity. Names handed out
//! by one process are strictly increasing: naming is serialized and a caller
//! that would get the same second as the previous name waits for the next
//! second. Segment directories are created exclusively, so a name already
//! taken by another process is skipped instead of reused.

use crate::{GeneratorError, Result};
use chrono::{TimeZone, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::Mutex;

/// Format of segment names
pub const SEGMENT_NAME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Directory inside a segment holding the fetch lists
pub const FETCH_LIST_DIR: &str = "crawl_generate";

/// Attempts at finding a free segment name before giving up
const MAX_NAME_ATTEMPTS: usize = 5;

/// Second (epoch) of the last name handed out by this process
fn last_issued() -> &'static Mutex<Option<i64>> {
    static LAST: OnceLock<Mutex<Option<i64>>> = OnceLock::new();
    LAST.get_or_init(|| Mutex::new(None))
}

/// An output segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    name: String,
    path: PathBuf,
}

impl Segment {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The segment directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory holding the segment's fetch lists
    pub fn fetch_list_dir(&self) -> PathBuf {
        self.path.join(FETCH_LIST_DIR)
    }
}

/// Returns a segment name later than any name this process returned before
pub async fn next_segment_name() -> String {
    let mut last = last_issued().lock().await;

    loop {
        let now = Utc::now();
        let second = now.timestamp();
        match *last {
            Some(previous) if second <= previous => {
                let next_second_millis = (previous + 1) * 1000;
                let wait = (next_second_millis - now.timestamp_millis()).max(1) as u64;
                tokio::time::sleep(Duration::from_millis(wait)).await;
            }
            _ => {
                *last = Some(second);
                return format_segment_name(second);
            }
        }
    }
}

fn format_segment_name(second: i64) -> String {
    Utc.timestamp_opt(second, 0)
        .single()
        .unwrap_or_default()
        .format(SEGMENT_NAME_FORMAT)
        .to_string()
}

/// Creates a new, empty segment under `segments_dir`
///
/// # Returns
///
/// * `Ok(Segment)` - The segment directory and its fetch-list directory exist
/// * `Err(GeneratorError::SegmentExists)` - No free name was found
pub async fn create_segment(segments_dir: &Path) -> Result<Segment> {
    std::fs::create_dir_all(segments_dir)?;

    let mut last_path = segments_dir.to_path_buf();
    for _ in 0..MAX_NAME_ATTEMPTS {
        let name = next_segment_name().await;
        let path = segments_dir.join(&name);

        match std::fs::create_dir(&path) {
            Ok(()) => {
                let segment = Segment { name, path };
                std::fs::create_dir(segment.fetch_list_dir())?;
                tracing::info!("Created segment {}", segment.path.display());
                return Ok(segment);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!("Segment {} already exists, trying a later name", name);
                last_path = path;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(GeneratorError::SegmentExists(last_path))
}
