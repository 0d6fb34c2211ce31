//! Storage traits and error types
//!
//! This module defines the trait interface for the content store and
//! associated error types.

use crate::state::{CatalogStatus, VisitState};
use crate::storage::{
    CatalogItem, ClaimedItem, FileRecord, InsertOutcome, NewFileRecord, RunRecord, RunStatus,
};
use rusqlite::ErrorCode;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another writer held the lock past the busy timeout
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                StorageError::WriteConflict(err.to_string())
            }
            _ => StorageError::Sqlite(err),
        }
    }
}

impl StorageError {
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, Self::WriteConflict(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for content store implementations
///
/// Row-level operations are atomic. Methods that change catalog state run
/// inside an immediate-mode transaction.
pub trait ContentStore {
    // ===== Files =====

    /// Looks up a file by its normalized URL
    fn get_by_url(&self, url: &str) -> StorageResult<Option<FileRecord>>;

    /// Looks up a file by SHA-256 content hash
    fn get_by_hash(&self, hash: &str) -> StorageResult<Option<FileRecord>>;

    /// Registers a file unless its URL or content hash is already stored
    ///
    /// Both checks and the insert happen in one write transaction, so two
    /// crawlers racing on identical bytes cannot both insert.
    fn insert_file(&mut self, record: &NewFileRecord) -> StorageResult<InsertOutcome>;

    /// All files in ascending id order, optionally for one site
    fn list_files(&self, site_name: Option<&str>) -> StorageResult<Vec<FileRecord>>;

    fn count_files(&self) -> StorageResult<u64>;

    /// File counts per site, sorted by site name
    fn count_files_by_site(&self) -> StorageResult<Vec<(String, u64)>>;

    // ===== Pages =====

    /// Records the last state a page reached in a crawl
    fn mark_page_seen(&mut self, url: &str, site_name: &str, state: VisitState)
        -> StorageResult<()>;

    fn count_pages(&self) -> StorageResult<u64>;

    // ===== Catalog =====

    /// Creates `pending` rows for stored files that have none under `version`
    ///
    /// Returns the number of rows created.
    fn enqueue_version(&mut self, version: &str) -> StorageResult<usize>;

    /// Pending items in ascending file id order, without claiming them
    fn get_pending_catalog_items(
        &self,
        version: &str,
        limit: usize,
    ) -> StorageResult<Vec<ClaimedItem>>;

    /// Atomically moves up to `limit` pending items to `processing`
    ///
    /// Items are taken in ascending file id order. `site_filter` tokens, when
    /// present, restrict the claim to sites whose name contains any of them.
    fn claim_pending(
        &mut self,
        version: &str,
        limit: usize,
        site_filter: &[String],
    ) -> StorageResult<Vec<ClaimedItem>>;

    /// Writes a result, keyed by `(file_id, version)`
    fn upsert_catalog_item(&mut self, item: &CatalogItem) -> StorageResult<()>;

    /// Returns claimed items to `pending`; terminal rows are left alone
    fn release_claims(&mut self, version: &str, file_ids: &[i64]) -> StorageResult<usize>;

    /// Manual retry transition: every `error` row of `version` back to `pending`
    fn reset_errors(&mut self, version: &str) -> StorageResult<usize>;

    /// Returns `processing` rows claimed longer ago than `older_than` to `pending`
    fn release_stale_claims(&mut self, version: &str, older_than: Duration)
        -> StorageResult<usize>;

    fn get_catalog_item(&self, file_id: i64, version: &str)
        -> StorageResult<Option<CatalogItem>>;

    /// Items of a version, optionally filtered by status, in file id order
    fn list_catalog_items(
        &self,
        version: &str,
        status: Option<CatalogStatus>,
    ) -> StorageResult<Vec<CatalogItem>>;

    fn count_catalog_by_status(&self, version: &str)
        -> StorageResult<HashMap<CatalogStatus, u64>>;

    // ===== Run Management =====

    /// Creates a new run and returns its id
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;
}
