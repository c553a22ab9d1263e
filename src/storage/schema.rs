//! Database schema definitions
//!
//! Two kinds of SQLite files exist: the crawl-state store (`records`, keyed by
//! URL) and part files (`entries`, an ordered sequence written by one
//! partition worker).

/// SQL schema for the crawl-state store
pub const RECORDS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    url TEXT PRIMARY KEY NOT NULL,
    status TEXT NOT NULL,
    fetch_time INTEGER NOT NULL,
    score REAL NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);
"#;

/// SQL schema for a part file
///
/// `seq` preserves the order the worker emitted entries in; `sort_score` is
/// only set for selection output.
pub const ENTRIES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    seq INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    fetch_time INTEGER NOT NULL,
    score REAL NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    sort_score REAL
);
"#;

/// Initializes the crawl-state store schema
pub fn initialize_records_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(RECORDS_SQL)
}

/// Initializes the part file schema
pub fn initialize_entries_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(ENTRIES_SQL)
}
