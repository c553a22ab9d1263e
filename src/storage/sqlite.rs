//! SQLite storage implementation
//!
//! This module provides the SQLite-backed crawl-state store and the part
//! files stage workers write their output to.

use crate::record::{CrawlRecord, CrawlStatus, Metadata};
use crate::storage::schema::{initialize_entries_schema, initialize_records_schema};
use crate::storage::traits::{RecordSource, RecordVisitor, StorageError, StorageResult};
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the live store version inside the store directory
pub const CURRENT_NAME: &str = "current.db";

/// File name the previous version is parked under while installing
pub const OLD_NAME: &str = "old.db";

/// Prefix of part file names
const PART_PREFIX: &str = "part-";

/// Returns the file name of the given part
pub fn part_file_name(partition: usize) -> String {
    format!("{}{:05}.db", PART_PREFIX, partition)
}

fn open_for_write(path: &Path) -> StorageResult<Connection> {
    let conn = Connection::open(path)?;

    // Rollback journal only: install() swaps the database as a single file.
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
    ",
    )?;

    Ok(conn)
}

fn open_read_only(path: &Path) -> StorageResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Column values of an encoded record
struct EncodedRecord {
    status: &'static str,
    fetch_time: i64,
    score: f64,
    metadata: String,
}

fn encode_record(record: &CrawlRecord) -> StorageResult<EncodedRecord> {
    Ok(EncodedRecord {
        status: record.status.to_db_string(),
        fetch_time: record.fetch_time.timestamp_millis(),
        score: f64::from(record.score),
        metadata: record.metadata.to_json()?,
    })
}

fn decode_record(
    url: &str,
    status: &str,
    fetch_time: i64,
    score: f64,
    metadata: &str,
) -> StorageResult<CrawlRecord> {
    let status = CrawlStatus::from_db_string(status)
        .ok_or_else(|| StorageError::Corrupt(format!("{}: unknown status '{}'", url, status)))?;
    let fetch_time = Utc
        .timestamp_millis_opt(fetch_time)
        .single()
        .ok_or_else(|| {
            StorageError::Corrupt(format!("{}: fetch time {} out of range", url, fetch_time))
        })?;

    Ok(CrawlRecord {
        status,
        fetch_time,
        score: score as f32,
        metadata: Metadata::from_json(metadata)?,
    })
}

/// The crawl-state store: a directory holding one SQLite version of all records
///
/// ```text
/// <store>/current.db   live version, table `records` keyed by URL
/// <store>/.locked      lock marker (see `StoreLock`)
/// ```
pub struct CrawlDb {
    dir: PathBuf,
    conn: Connection,
}

impl CrawlDb {
    /// Creates a store directory with an empty version, or opens an existing one
    pub fn create(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        let conn = open_for_write(&dir.join(CURRENT_NAME))?;
        initialize_records_schema(&conn)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            conn,
        })
    }

    /// Opens an existing store
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlDb)` - The store's current version is open
    /// * `Err(StorageError::MissingStore)` - The directory holds no current version
    pub fn open(dir: &Path) -> StorageResult<Self> {
        let current = dir.join(CURRENT_NAME);
        if !current.is_file() {
            return Err(StorageError::MissingStore(dir.to_path_buf()));
        }

        let conn = open_for_write(&current)?;
        initialize_records_schema(&conn)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            conn,
        })
    }

    /// Returns the store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Inserts or replaces records in a single transaction
    pub fn put_records(&mut self, records: &[(String, CrawlRecord)]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO records (url, status, fetch_time, score, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (url, record) in records {
                let enc = encode_record(record)?;
                stmt.execute(params![url, enc.status, enc.fetch_time, enc.score, enc.metadata])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Looks up a single record
    ///
    /// Only used by tooling and tests; the generator streams via `scan`.
    pub fn get(&self, url: &str) -> StorageResult<Option<CrawlRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT status, fetch_time, score, metadata FROM records WHERE url = ?1",
                params![url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(status, fetch_time, score, metadata)| {
            decode_record(url, &status, fetch_time, score, &metadata)
        })
        .transpose()
    }

    /// Counts the records in the current version
    pub fn count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Replaces the current version with a completed new one
    ///
    /// The live file is parked as `old.db`, the new version is renamed into
    /// place, then the parked file is deleted. `new_version` must live on the
    /// same filesystem as the store directory.
    pub fn install(self, new_version: &Path) -> StorageResult<()> {
        let CrawlDb { dir, conn } = self;
        conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;

        let current = dir.join(CURRENT_NAME);
        let old = dir.join(OLD_NAME);

        if old.exists() {
            fs::remove_file(&old)?;
        }
        if current.exists() {
            fs::rename(&current, &old)?;
        }
        fs::rename(new_version, &current)?;
        if old.exists() {
            fs::remove_file(&old)?;
        }

        tracing::debug!("Installed new store version at {}", current.display());
        Ok(())
    }
}

impl RecordSource for CrawlDb {
    fn scan(&self, visit: &mut RecordVisitor<'_>) -> StorageResult<()> {
        let mut stmt = self.conn.prepare(
            "SELECT url, status, fetch_time, score, metadata FROM records ORDER BY url",
        )?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let url: String = row.get(0)?;
            let status: String = row.get(1)?;
            let record = decode_record(&url, &status, row.get(2)?, row.get(3)?, &row.get::<_, String>(4)?)?;
            visit(url, record)?;
        }

        Ok(())
    }
}

/// Writes a complete new store version to a standalone file
pub struct CrawlDbWriter {
    conn: Connection,
    written: u64,
}

impl CrawlDbWriter {
    pub fn create(path: &Path) -> StorageResult<Self> {
        let conn = open_for_write(path)?;
        initialize_records_schema(&conn)?;
        conn.execute_batch("BEGIN")?;
        Ok(Self { conn, written: 0 })
    }

    pub fn put(&mut self, url: &str, record: &CrawlRecord) -> StorageResult<()> {
        let enc = encode_record(record)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO records (url, status, fetch_time, score, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        stmt.execute(params![url, enc.status, enc.fetch_time, enc.score, enc.metadata])?;
        self.written += 1;
        Ok(())
    }

    /// Commits and closes the file, returning the number of records written
    pub fn finish(self) -> StorageResult<u64> {
        self.conn.execute_batch("COMMIT")?;
        self.conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        Ok(self.written)
    }
}

/// One entry of a part file
#[derive(Debug, Clone, PartialEq)]
pub struct PartEntry {
    pub url: String,
    pub record: CrawlRecord,
    pub sort_score: Option<f32>,
}

/// Appends entries to a part file in emission order
pub struct PartWriter {
    conn: Connection,
    seq: i64,
}

impl PartWriter {
    pub fn create(path: &Path) -> StorageResult<Self> {
        let conn = open_for_write(path)?;
        initialize_entries_schema(&conn)?;
        conn.execute_batch("BEGIN")?;
        Ok(Self { conn, seq: 0 })
    }

    pub fn append(
        &mut self,
        url: &str,
        record: &CrawlRecord,
        sort_score: Option<f32>,
    ) -> StorageResult<()> {
        let enc = encode_record(record)?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO entries (seq, url, status, fetch_time, score, metadata, sort_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        stmt.execute(params![
            self.seq,
            url,
            enc.status,
            enc.fetch_time,
            enc.score,
            enc.metadata,
            sort_score.map(f64::from),
        ])?;
        self.seq += 1;
        Ok(())
    }

    /// Commits and closes the part, returning the number of entries written
    pub fn finish(self) -> StorageResult<u64> {
        self.conn.execute_batch("COMMIT")?;
        let written = self.seq as u64;
        self.conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        Ok(written)
    }
}

/// Reads a part file back in emission order
pub struct PartReader {
    conn: Connection,
}

impl PartReader {
    pub fn open(path: &Path) -> StorageResult<Self> {
        Ok(Self {
            conn: open_read_only(path)?,
        })
    }

    /// Streams every entry in emission order
    pub fn scan_entries(
        &self,
        visit: &mut dyn FnMut(PartEntry) -> StorageResult<()>,
    ) -> StorageResult<()> {
        self.scan_limited(None, visit)
    }

    /// Reads the first entry, if any
    pub fn first(&self) -> StorageResult<Option<PartEntry>> {
        let mut first = None;
        self.scan_limited(Some(1), &mut |entry| {
            first = Some(entry);
            Ok(())
        })?;
        Ok(first)
    }

    pub fn count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn scan_limited(
        &self,
        limit: Option<i64>,
        visit: &mut dyn FnMut(PartEntry) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let mut stmt = self.conn.prepare(
            "SELECT url, status, fetch_time, score, metadata, sort_score
             FROM entries ORDER BY seq LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit.unwrap_or(-1)])?;

        while let Some(row) = rows.next()? {
            let url: String = row.get(0)?;
            let status: String = row.get(1)?;
            let record = decode_record(&url, &status, row.get(2)?, row.get(3)?, &row.get::<_, String>(4)?)?;
            let sort_score: Option<f64> = row.get(5)?;
            visit(PartEntry {
                url,
                record,
                sort_score: sort_score.map(|s| s as f32),
            })?;
        }

        Ok(())
    }
}

impl RecordSource for PartReader {
    fn scan(&self, visit: &mut RecordVisitor<'_>) -> StorageResult<()> {
        self.scan_entries(&mut |entry| visit(entry.url, entry.record))
    }
}

/// All part files of one stage output directory, in partition order
pub struct PartSet {
    parts: Vec<PathBuf>,
}

impl PartSet {
    /// Lists the part files under `dir`
    pub fn open(dir: &Path) -> StorageResult<Self> {
        let mut parts = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_part = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(PART_PREFIX) && n.ends_with(".db"))
                .unwrap_or(false);
            if is_part && path.is_file() {
                parts.push(path);
            }
        }
        parts.sort();
        Ok(Self { parts })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.parts
    }

    /// Returns true if no part holds a single entry
    ///
    /// Reads at most one entry per part.
    pub fn is_empty(&self) -> StorageResult<bool> {
        for path in &self.parts {
            if PartReader::open(path)?.first()?.is_some() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Streams the entries of every part, part by part
    pub fn scan_entries(
        &self,
        visit: &mut dyn FnMut(PartEntry) -> StorageResult<()>,
    ) -> StorageResult<()> {
        for path in &self.parts {
            PartReader::open(path)?.scan_entries(visit)?;
        }
        Ok(())
    }

    /// Counts entries across all parts
    pub fn count(&self) -> StorageResult<u64> {
        let mut total = 0;
        for path in &self.parts {
            total += PartReader::open(path)?.count()?;
        }
        Ok(total)
    }
}

impl RecordSource for PartSet {
    fn scan(&self, visit: &mut RecordVisitor<'_>) -> StorageResult<()> {
        self.scan_entries(&mut |entry| visit(entry.url, entry.record))
    }
}
