//! Integration tests for the generator
//!
//! These tests seed a crawl-state store in a temporary directory and run
//! complete generations against it.

use chrono::{DateTime, Duration, Utc};
use fetchlist_generator::config::Config;
use fetchlist_generator::generator::url_hash;
use fetchlist_generator::storage::{CrawlDb, PartSet, StorageError, StoreLock};
use fetchlist_generator::{
    CrawlRecord, CrawlStatus, GenerateOptions, Generator, GeneratorError, PluginRegistry, Segment,
};
use std::path::Path;
use tempfile::TempDir;

/// Creates a single-partition configuration
fn test_config() -> Config {
    let mut config = Config::default();
    config.runtime.workers = Some(1);
    config.runtime.reduce_tasks = Some(1);
    config
}

fn generator(config: Config) -> Generator {
    let plugins = PluginRegistry::builtin()
        .resolve(&config)
        .expect("Failed to resolve plugins");
    Generator::new(config, plugins)
}

fn due_at(time: DateTime<Utc>, score: f32) -> CrawlRecord {
    CrawlRecord::new(CrawlStatus::Unfetched, time - Duration::hours(1), score)
}

fn seed_store(dir: &Path, records: Vec<(&str, CrawlRecord)>) {
    let mut db = CrawlDb::create(dir).expect("Failed to create store");
    let records: Vec<(String, CrawlRecord)> = records
        .into_iter()
        .map(|(url, rec)| (url.to_string(), rec))
        .collect();
    db.put_records(&records).expect("Failed to seed store");
}

fn options_at(cur_time: DateTime<Utc>) -> GenerateOptions {
    GenerateOptions {
        num_lists: Some(1),
        cur_time,
        ..GenerateOptions::default()
    }
}

/// Reads every fetch list of a segment, list by list
fn segment_urls(segment: &Segment) -> Vec<String> {
    let parts = PartSet::open(&segment.fetch_list_dir()).expect("Failed to open segment");
    let mut urls = Vec::new();
    parts
        .scan_entries(&mut |entry| {
            urls.push(entry.url);
            Ok(())
        })
        .expect("Failed to read segment");
    urls
}

fn sorted(mut urls: Vec<String>) -> Vec<String> {
    urls.sort();
    urls
}

#[tokio::test]
async fn test_gone_and_permanent_redirects_never_selected() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();

    let mut gone = due_at(now, 100.0);
    gone.status = CrawlStatus::Gone;
    let mut moved = due_at(now, 100.0);
    moved.status = CrawlStatus::RedirPerm;
    let mut temp = due_at(now, 1.0);
    temp.status = CrawlStatus::RedirTemp;

    seed_store(
        store.path(),
        vec![
            ("http://gone.com/", gone),
            ("http://moved.com/", moved),
            ("http://temp.com/", temp),
            ("http://fresh.com/", due_at(now, 1.0)),
        ],
    );

    let segment = generator(test_config())
        .generate(store.path(), segments.path(), options_at(now))
        .await
        .unwrap()
        .expect("Expected a segment");

    assert_eq!(
        sorted(segment_urls(&segment)),
        vec!["http://fresh.com/", "http://temp.com/"]
    );
}

#[tokio::test]
async fn test_nothing_due_produces_no_segment() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let scratch_root = TempDir::new().unwrap();
    let now = Utc::now();

    let future = CrawlRecord::new(CrawlStatus::Unfetched, now + Duration::days(1), 1.0);
    seed_store(store.path(), vec![("http://later.com/", future)]);

    let mut config = test_config();
    config.runtime.temp_dir = Some(scratch_root.path().to_path_buf());

    let outcome = generator(config)
        .generate(store.path(), segments.path(), options_at(now))
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert!(!StoreLock::is_locked(store.path()));
    assert_eq!(std::fs::read_dir(segments.path()).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);

    let db = CrawlDb::open(store.path()).unwrap();
    assert_eq!(db.count().unwrap(), 1);
    let untouched = db.get("http://later.com/").unwrap().unwrap();
    assert!(untouched.generation_mark().is_none());
}

#[tokio::test]
async fn test_top_n_keeps_best_scores() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();

    seed_store(
        store.path(),
        vec![
            ("http://low.com/", due_at(now, 0.2)),
            ("http://high.com/", due_at(now, 0.9)),
            ("http://mid.com/", due_at(now, 0.5)),
        ],
    );

    let options = GenerateOptions {
        top_n: 2,
        ..options_at(now)
    };
    let segment = generator(test_config())
        .generate(store.path(), segments.path(), options)
        .await
        .unwrap()
        .expect("Expected a segment");

    assert_eq!(
        sorted(segment_urls(&segment)),
        vec!["http://high.com/", "http://mid.com/"]
    );
}

#[tokio::test]
async fn test_max_per_host() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();

    let urls: Vec<String> = (0..5).map(|i| format!("http://busy.com/{}", i)).collect();
    let mut records: Vec<(&str, CrawlRecord)> = urls
        .iter()
        .map(|url| (url.as_str(), due_at(now, 1.0)))
        .collect();
    records.push(("http://quiet.com/", due_at(now, 1.0)));
    seed_store(store.path(), records);

    let mut config = test_config();
    config.generate.max_per_host = 2;

    let segment = generator(config)
        .generate(store.path(), segments.path(), options_at(now))
        .await
        .unwrap()
        .expect("Expected a segment");

    let selected = segment_urls(&segment);
    let busy = selected.iter().filter(|u| u.starts_with("http://busy.com/")).count();
    assert_eq!(busy, 2);
    assert!(selected.contains(&"http://quiet.com/".to_string()));
}

#[tokio::test]
async fn test_fetch_list_ordered_by_url_hash() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();

    seed_store(
        store.path(),
        vec![
            ("http://example.com/a", due_at(now, 0.9)),
            ("http://example.com/b", due_at(now, 0.1)),
            ("http://a.com/", due_at(now, 0.5)),
        ],
    );

    let segment = generator(test_config())
        .generate(store.path(), segments.path(), options_at(now))
        .await
        .unwrap()
        .expect("Expected a segment");

    let urls = segment_urls(&segment);
    assert_eq!(
        urls,
        vec!["http://a.com/", "http://example.com/b", "http://example.com/a"]
    );
    let hashes: Vec<i32> = urls.iter().map(|u| url_hash(u)).collect();
    assert!(hashes.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_locked_store_is_refused_unless_forced() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();
    seed_store(store.path(), vec![("http://a.com/", due_at(now, 1.0))]);

    let held = StoreLock::acquire(store.path(), false, "another run").unwrap();

    let refused = generator(test_config())
        .generate(store.path(), segments.path(), options_at(now))
        .await;
    assert!(matches!(
        refused,
        Err(GeneratorError::Storage(StorageError::Locked(_)))
    ));
    assert!(StoreLock::is_locked(store.path()));

    let forced = generator(test_config())
        .generate(
            store.path(),
            segments.path(),
            GenerateOptions {
                force: true,
                ..options_at(now)
            },
        )
        .await
        .unwrap();
    assert!(forced.is_some());
    assert!(!StoreLock::is_locked(store.path()));

    held.release().unwrap();
}

#[tokio::test]
async fn test_claimed_records_stay_in_flight_until_delay_elapses() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();
    seed_store(store.path(), vec![("http://a.com/", due_at(now, 1.0))]);

    let mut config = test_config();
    config.generate.update_crawldb = true;
    let generator = generator(config);

    let first = generator
        .generate(store.path(), segments.path(), options_at(now))
        .await
        .unwrap();
    assert!(first.is_some());

    let claimed = CrawlDb::open(store.path())
        .unwrap()
        .get("http://a.com/")
        .unwrap()
        .unwrap();
    assert!(claimed.generation_mark().is_some());

    let again = generator
        .generate(store.path(), segments.path(), options_at(now + Duration::days(6)))
        .await
        .unwrap();
    assert!(again.is_none());

    let later = generator
        .generate(store.path(), segments.path(), options_at(now + Duration::days(8)))
        .await
        .unwrap()
        .expect("Expected the claim to have expired");
    assert_eq!(segment_urls(&later), vec!["http://a.com/"]);
}

#[tokio::test]
async fn test_without_store_update_records_are_reselected() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();
    seed_store(store.path(), vec![("http://a.com/", due_at(now, 1.0))]);

    let generator = generator(test_config());
    let first = generator
        .generate(store.path(), segments.path(), options_at(now))
        .await
        .unwrap()
        .expect("Expected a segment");
    let second = generator
        .generate(store.path(), segments.path(), options_at(now))
        .await
        .unwrap()
        .expect("Expected a segment");

    assert!(second.name() > first.name());
    let record = CrawlDb::open(store.path())
        .unwrap()
        .get("http://a.com/")
        .unwrap()
        .unwrap();
    assert!(record.generation_mark().is_none());
}

#[tokio::test]
async fn test_top_n_is_split_across_selection_partitions() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();

    let urls: Vec<String> = (0..10).map(|i| format!("http://host{}.com/", i)).collect();
    seed_store(
        store.path(),
        urls.iter().map(|u| (u.as_str(), due_at(now, 1.0))).collect(),
    );

    let mut config = test_config();
    config.runtime.reduce_tasks = Some(2);

    // topN / partitions = 2 per partition; the global bound is approximate.
    let options = GenerateOptions {
        top_n: 5,
        ..options_at(now)
    };
    let segment = generator(config)
        .generate(store.path(), segments.path(), options)
        .await
        .unwrap()
        .expect("Expected a segment");

    assert_eq!(segment_urls(&segment).len(), 4);
}

#[tokio::test]
async fn test_url_filters_apply_unless_disabled() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();
    seed_store(
        store.path(),
        vec![
            ("http://spam.com/", due_at(now, 1.0)),
            ("http://ham.com/", due_at(now, 1.0)),
        ],
    );

    let mut config = test_config();
    config.domain_filter.deny = vec!["spam.com".to_string()];
    let generator = generator(config);

    let filtered = generator
        .generate(store.path(), segments.path(), options_at(now))
        .await
        .unwrap()
        .expect("Expected a segment");
    assert_eq!(segment_urls(&filtered), vec!["http://ham.com/"]);

    let unfiltered = generator
        .generate(
            store.path(),
            segments.path(),
            GenerateOptions {
                filter: false,
                ..options_at(now)
            },
        )
        .await
        .unwrap()
        .expect("Expected a segment");
    assert_eq!(segment_urls(&unfiltered).len(), 2);
}

#[tokio::test]
async fn test_fetch_list_count() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();

    let urls: Vec<String> = (0..12).map(|i| format!("http://site{}.org/", i)).collect();
    seed_store(
        store.path(),
        urls.iter().map(|u| (u.as_str(), due_at(now, 1.0))).collect(),
    );

    let options = GenerateOptions {
        num_lists: Some(3),
        ..options_at(now)
    };
    let segment = generator(test_config())
        .generate(store.path(), segments.path(), options)
        .await
        .unwrap()
        .expect("Expected a segment");

    let parts = PartSet::open(&segment.fetch_list_dir()).unwrap();
    assert_eq!(parts.paths().len(), 3);
    assert_eq!(parts.count().unwrap(), 12);
}

#[tokio::test]
async fn test_missing_store() {
    let root = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();

    let result = generator(test_config())
        .generate(&root.path().join("nope"), segments.path(), options_at(Utc::now()))
        .await;
    assert!(matches!(
        result,
        Err(GeneratorError::Storage(StorageError::MissingStore(_)))
    ));
}

#[tokio::test]
async fn test_zero_fetch_lists_is_rejected_and_lock_released() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let now = Utc::now();
    seed_store(store.path(), vec![("http://a.com/", due_at(now, 1.0))]);

    let result = generator(test_config())
        .generate(
            store.path(),
            segments.path(),
            GenerateOptions {
                num_lists: Some(0),
                ..options_at(now)
            },
        )
        .await;
    assert!(matches!(result, Err(GeneratorError::InvalidArgument(_))));
    assert!(!StoreLock::is_locked(store.path()));
}

#[tokio::test]
async fn test_failed_segment_creation_releases_lock_and_scratch() {
    let store = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let scratch_root = TempDir::new().unwrap();
    let now = Utc::now();
    seed_store(store.path(), vec![("http://a.com/", due_at(now, 1.0))]);

    // Selection succeeds, but the segments root is a regular file.
    let segments = root.path().join("segments");
    std::fs::write(&segments, b"not a directory").unwrap();

    let mut config = test_config();
    config.runtime.temp_dir = Some(scratch_root.path().to_path_buf());

    let result = generator(config)
        .generate(store.path(), &segments, options_at(now))
        .await;

    assert!(result.is_err());
    assert!(!StoreLock::is_locked(store.path()));
    assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);
    assert!(segments.is_file());
}

#[tokio::test]
async fn test_failed_store_update_keeps_store_and_cleans_up() {
    let store = TempDir::new().unwrap();
    let segments = TempDir::new().unwrap();
    let scratch_root = TempDir::new().unwrap();
    let now = Utc::now();
    seed_store(store.path(), vec![("http://a.com/", due_at(now, 1.0))]);

    // A directory where the previous version is parked makes the install fail.
    std::fs::create_dir(store.path().join("old.db")).unwrap();

    let mut config = test_config();
    config.generate.update_crawldb = true;
    config.runtime.temp_dir = Some(scratch_root.path().to_path_buf());

    let result = generator(config)
        .generate(store.path(), segments.path(), options_at(now))
        .await;

    assert!(result.is_err());
    assert!(!StoreLock::is_locked(store.path()));
    assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);

    let leftovers: Vec<String> = std::fs::read_dir(store.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".generate-update-"))
        .collect();
    assert!(leftovers.is_empty(), "update scratch left behind: {:?}", leftovers);

    let db = CrawlDb::open(store.path()).unwrap();
    let record = db.get("http://a.com/").unwrap().unwrap();
    assert!(record.generation_mark().is_none());
}
