//! Content store
//!
//! This module handles all persistence for the pipeline:
//! - File records, deduplicated by URL and by SHA-256 content hash
//! - Catalog items per file and catalog version, with claim/commit discipline
//! - Visited pages and run bookkeeping
//!
//! Every writer connection takes the write lock up front
//! (`BEGIN IMMEDIATE`), and commits from worker threads in one process are
//! additionally serialized through [`COMMIT_LOCK`].

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ContentStore, StorageError, StorageResult};

use crate::state::CatalogStatus;
use chrono::Utc;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Serializes commit points across worker threads of one process
///
/// SQLite allows one writer at a time regardless of transaction mode, so
/// threads queue here instead of spinning on `SQLITE_BUSY`.
pub static COMMIT_LOCK: Mutex<()> = Mutex::new(());

/// Acquires [`COMMIT_LOCK`], recovering from a poisoned lock
pub fn commit_guard() -> MutexGuard<'static, ()> {
    COMMIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Opens (or creates) the store at the given path
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    pub url: String,
    pub content_hash: Option<String>,
    pub local_path: Option<String>,
    pub site_name: String,
    pub title: Option<String>,
    pub original_filename: Option<String>,
    pub source_page_url: Option<String>,
    pub bytes: i64,
    pub content_type: Option<String>,
    pub published_time: Option<String>,
    pub discovered_at: String,
}

/// A document about to be registered; the store assigns id and timestamp
#[derive(Debug, Clone, Default)]
pub struct NewFileRecord {
    pub url: String,
    pub content_hash: Option<String>,
    pub local_path: Option<String>,
    pub site_name: String,
    pub title: Option<String>,
    pub original_filename: Option<String>,
    pub source_page_url: Option<String>,
    pub bytes: i64,
    pub content_type: Option<String>,
    pub published_time: Option<String>,
}

/// Result of registering a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New record with this id
    Inserted(i64),
    /// The URL is already stored under this id
    DuplicateUrl(i64),
    /// Identical bytes are already stored under this id
    DuplicateHash(i64),
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    pub fn file_id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::DuplicateUrl(id) | Self::DuplicateHash(id) => *id,
        }
    }
}

/// Extraction result for one file under one catalog version
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub file_id: i64,
    pub version: String,
    pub status: CatalogStatus,
    pub category: Option<String>,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub error_message: Option<String>,
    pub updated_at: String,
}

impl CatalogItem {
    fn with_status(file_id: i64, version: &str, status: CatalogStatus) -> Self {
        Self {
            file_id,
            version: version.to_string(),
            status,
            category: None,
            summary: None,
            keywords: Vec::new(),
            error_message: None,
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn ok(
        file_id: i64,
        version: &str,
        category: String,
        summary: String,
        keywords: Vec<String>,
    ) -> Self {
        Self {
            category: Some(category),
            summary: Some(summary),
            keywords,
            ..Self::with_status(file_id, version, CatalogStatus::Ok)
        }
    }

    pub fn skipped(file_id: i64, version: &str, keywords: Vec<String>) -> Self {
        Self {
            keywords,
            ..Self::with_status(file_id, version, CatalogStatus::Skipped)
        }
    }

    pub fn error(file_id: i64, version: &str, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::with_status(file_id, version, CatalogStatus::Error)
        }
    }
}

/// Immutable snapshot of a claimed row, handed to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedItem {
    pub file_id: i64,
    pub version: String,
    pub url: String,
    pub local_path: Option<String>,
    pub site_name: String,
    pub title: Option<String>,
    pub original_filename: Option<String>,
    pub source_page_url: Option<String>,
    pub content_type: Option<String>,
    pub published_time: Option<String>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_catalog_item_constructors() {
        let ok = CatalogItem::ok(1, "v1", "AI".into(), "s".into(), vec!["llm".into()]);
        assert_eq!(ok.status, CatalogStatus::Ok);
        assert_eq!(ok.category.as_deref(), Some("AI"));

        let err = CatalogItem::error(2, "v1", "File not found");
        assert_eq!(err.status, CatalogStatus::Error);
        assert!(err.category.is_none());
        assert_eq!(err.error_message.as_deref(), Some("File not found"));
    }

    #[test]
    fn test_insert_outcome_id() {
        assert_eq!(InsertOutcome::DuplicateHash(7).file_id(), 7);
        assert!(!InsertOutcome::DuplicateUrl(3).is_inserted());
        assert!(InsertOutcome::Inserted(1).is_inserted());
    }
}
