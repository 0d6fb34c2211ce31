//! Database schema definitions
//!
//! `files` and `catalog_items` are the core tables; `pages` and `runs` are
//! bookkeeping for the crawler.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl and catalog runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per distinct stored document
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    content_hash TEXT UNIQUE,
    local_path TEXT,
    site_name TEXT NOT NULL,
    title TEXT,
    original_filename TEXT,
    source_page_url TEXT,
    bytes INTEGER NOT NULL DEFAULT 0,
    content_type TEXT,
    published_time TEXT,
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_site ON files(site_name);

-- Extraction state per file and catalog version
CREATE TABLE IF NOT EXISTS catalog_items (
    file_id INTEGER NOT NULL REFERENCES files(id),
    version TEXT NOT NULL,
    status TEXT NOT NULL,
    category TEXT,
    summary TEXT,
    keywords TEXT NOT NULL DEFAULT '[]',
    error_message TEXT,
    claimed_at TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (file_id, version)
);

CREATE INDEX IF NOT EXISTS idx_catalog_status ON catalog_items(version, status, file_id);

-- Pages visited by the crawler
CREATE TABLE IF NOT EXISTS pages (
    url TEXT PRIMARY KEY,
    site_name TEXT NOT NULL,
    state TEXT NOT NULL,
    last_seen TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
