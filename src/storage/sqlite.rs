//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ContentStore trait.

use crate::state::{CatalogStatus, VisitState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ContentStore, StorageError, StorageResult};
use crate::storage::{
    commit_guard, CatalogItem, ClaimedItem, FileRecord, InsertOutcome, NewFileRecord, RunRecord,
    RunStatus,
};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const FILE_COLUMNS: &str = "id, url, content_hash, local_path, site_name, title, \
     original_filename, source_page_url, bytes, content_type, published_time, discovered_at";

const CLAIM_COLUMNS: &str = "c.file_id, c.version, f.url, f.local_path, f.site_name, f.title, \
     f.original_filename, f.source_page_url, f.content_type, f.published_time";

const CATALOG_COLUMNS: &str =
    "file_id, version, status, category, summary, keywords, error_message, updated_at";

/// How long a connection waits on another writer before reporting a conflict
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite storage backend
///
/// One instance owns one connection. Worker threads each open their own.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and ensures the schema exists
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Overrides how long writes wait for a competing writer
    pub fn set_busy_timeout(&self, timeout: Duration) -> StorageResult<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }
}

fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        content_hash: row.get(2)?,
        local_path: row.get(3)?,
        site_name: row.get(4)?,
        title: row.get(5)?,
        original_filename: row.get(6)?,
        source_page_url: row.get(7)?,
        bytes: row.get(8)?,
        content_type: row.get(9)?,
        published_time: row.get(10)?,
        discovered_at: row.get(11)?,
    })
}

fn row_to_claimed(row: &Row<'_>) -> rusqlite::Result<ClaimedItem> {
    Ok(ClaimedItem {
        file_id: row.get(0)?,
        version: row.get(1)?,
        url: row.get(2)?,
        local_path: row.get(3)?,
        site_name: row.get(4)?,
        title: row.get(5)?,
        original_filename: row.get(6)?,
        source_page_url: row.get(7)?,
        content_type: row.get(8)?,
        published_time: row.get(9)?,
    })
}

fn row_to_catalog_item(row: &Row<'_>) -> rusqlite::Result<CatalogItem> {
    let keywords: String = row.get(5)?;
    Ok(CatalogItem {
        file_id: row.get(0)?,
        version: row.get(1)?,
        status: CatalogStatus::from_db_string(&row.get::<_, String>(2)?)
            .unwrap_or(CatalogStatus::Error),
        category: row.get(3)?,
        summary: row.get(4)?,
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        error_message: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl ContentStore for SqliteStorage {
    // ===== Files =====

    fn get_by_url(&self, url: &str) -> StorageResult<Option<FileRecord>> {
        let sql = format!("SELECT {} FROM files WHERE url = ?1", FILE_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![url], row_to_file)
            .optional()?)
    }

    fn get_by_hash(&self, hash: &str) -> StorageResult<Option<FileRecord>> {
        let sql = format!("SELECT {} FROM files WHERE content_hash = ?1", FILE_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![hash], row_to_file)
            .optional()?)
    }

    fn insert_file(&mut self, record: &NewFileRecord) -> StorageResult<InsertOutcome> {
        let _guard = commit_guard();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let by_url: Option<i64> = tx
            .query_row(
                "SELECT id FROM files WHERE url = ?1",
                params![record.url],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = by_url {
            return Ok(InsertOutcome::DuplicateUrl(id));
        }

        if let Some(hash) = &record.content_hash {
            let by_hash: Option<i64> = tx
                .query_row(
                    "SELECT id FROM files WHERE content_hash = ?1",
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = by_hash {
                return Ok(InsertOutcome::DuplicateHash(id));
            }
        }

        tx.execute(
            "INSERT INTO files (url, content_hash, local_path, site_name, title, original_filename,
             source_page_url, bytes, content_type, published_time, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.url,
                record.content_hash,
                record.local_path,
                record.site_name,
                record.title,
                record.original_filename,
                record.source_page_url,
                record.bytes,
                record.content_type,
                record.published_time,
                now_ts(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(InsertOutcome::Inserted(id))
    }

    fn list_files(&self, site_name: Option<&str>) -> StorageResult<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {} FROM files WHERE (?1 IS NULL OR site_name = ?1) ORDER BY id ASC",
            FILE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let files = stmt
            .query_map(params![site_name], row_to_file)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    fn count_files(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_files_by_site(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT site_name, COUNT(*) FROM files GROUP BY site_name ORDER BY site_name")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ===== Pages =====

    fn mark_page_seen(
        &mut self,
        url: &str,
        site_name: &str,
        state: VisitState,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO pages (url, site_name, state, last_seen) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url) DO UPDATE SET
                site_name = excluded.site_name,
                state = excluded.state,
                last_seen = excluded.last_seen",
            params![url, site_name, state.to_db_string(), now_ts()],
        )?;
        Ok(())
    }

    fn count_pages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Catalog =====

    fn enqueue_version(&mut self, version: &str) -> StorageResult<usize> {
        let _guard = commit_guard();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let created = tx.execute(
            "INSERT OR IGNORE INTO catalog_items (file_id, version, status, keywords, updated_at)
             SELECT id, ?1, ?2, '[]', ?3 FROM files
             WHERE local_path IS NOT NULL
             ORDER BY id ASC",
            params![version, CatalogStatus::Pending.to_db_string(), now_ts()],
        )?;
        tx.commit()?;
        Ok(created)
    }

    fn get_pending_catalog_items(
        &self,
        version: &str,
        limit: usize,
    ) -> StorageResult<Vec<ClaimedItem>> {
        let sql = format!(
            "SELECT {} FROM catalog_items c JOIN files f ON f.id = c.file_id
             WHERE c.version = ?1 AND c.status = ?2
             ORDER BY c.file_id ASC LIMIT ?3",
            CLAIM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(
                params![version, CatalogStatus::Pending.to_db_string(), limit as i64],
                row_to_claimed,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn claim_pending(
        &mut self,
        version: &str,
        limit: usize,
        site_filter: &[String],
    ) -> StorageResult<Vec<ClaimedItem>> {
        let mut sql = format!(
            "SELECT {} FROM catalog_items c JOIN files f ON f.id = c.file_id
             WHERE c.version = ? AND c.status = ?",
            CLAIM_COLUMNS
        );
        let mut values = vec![
            version.to_string(),
            CatalogStatus::Pending.to_db_string().to_string(),
        ];
        if !site_filter.is_empty() {
            let clauses = vec!["lower(f.site_name) LIKE ?"; site_filter.len()];
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
            values.extend(site_filter.iter().map(|t| format!("%{}%", t.to_lowercase())));
        }
        sql.push_str(&format!(" ORDER BY c.file_id ASC LIMIT {}", limit));

        let _guard = commit_guard();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let items = {
            let mut stmt = tx.prepare(&sql)?;
            let items = stmt
                .query_map(params_from_iter(values.iter()), row_to_claimed)?
                .collect::<Result<Vec<_>, _>>()?;

            let claimed_at = now_ts();
            let mut update = tx.prepare(
                "UPDATE catalog_items SET status = ?1, claimed_at = ?2, updated_at = ?2
                 WHERE file_id = ?3 AND version = ?4 AND status = ?5",
            )?;
            for item in &items {
                update.execute(params![
                    CatalogStatus::Processing.to_db_string(),
                    claimed_at,
                    item.file_id,
                    item.version,
                    CatalogStatus::Pending.to_db_string(),
                ])?;
            }
            items
        };

        tx.commit()?;
        Ok(items)
    }

    fn upsert_catalog_item(&mut self, item: &CatalogItem) -> StorageResult<()> {
        let keywords = serde_json::to_string(&item.keywords)?;

        let _guard = commit_guard();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO catalog_items
                (file_id, version, status, category, summary, keywords, error_message, claimed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)
             ON CONFLICT(file_id, version) DO UPDATE SET
                status = excluded.status,
                category = excluded.category,
                summary = excluded.summary,
                keywords = excluded.keywords,
                error_message = excluded.error_message,
                claimed_at = NULL,
                updated_at = excluded.updated_at",
            params![
                item.file_id,
                item.version,
                item.status.to_db_string(),
                item.category,
                item.summary,
                keywords,
                item.error_message,
                item.updated_at,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn release_claims(&mut self, version: &str, file_ids: &[i64]) -> StorageResult<usize> {
        if file_ids.is_empty() {
            return Ok(0);
        }

        let _guard = commit_guard();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut released = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE catalog_items SET status = ?1, claimed_at = NULL, updated_at = ?2
                 WHERE file_id = ?3 AND version = ?4 AND status = ?5",
            )?;
            let now = now_ts();
            for file_id in file_ids {
                released += stmt.execute(params![
                    CatalogStatus::Pending.to_db_string(),
                    now,
                    file_id,
                    version,
                    CatalogStatus::Processing.to_db_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(released)
    }

    fn reset_errors(&mut self, version: &str) -> StorageResult<usize> {
        let _guard = commit_guard();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let reset = tx.execute(
            "UPDATE catalog_items SET status = ?1, error_message = NULL, updated_at = ?2
             WHERE version = ?3 AND status = ?4",
            params![
                CatalogStatus::Pending.to_db_string(),
                now_ts(),
                version,
                CatalogStatus::Error.to_db_string(),
            ],
        )?;
        tx.commit()?;
        Ok(reset)
    }

    fn release_stale_claims(
        &mut self,
        version: &str,
        older_than: Duration,
    ) -> StorageResult<usize> {
        let age = chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = (Utc::now() - age).to_rfc3339_opts(SecondsFormat::Micros, true);

        let _guard = commit_guard();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let released = tx.execute(
            "UPDATE catalog_items SET status = ?1, claimed_at = NULL, updated_at = ?2
             WHERE version = ?3 AND status = ?4
             AND (claimed_at IS NULL OR claimed_at < ?5)",
            params![
                CatalogStatus::Pending.to_db_string(),
                now_ts(),
                version,
                CatalogStatus::Processing.to_db_string(),
                cutoff,
            ],
        )?;
        tx.commit()?;
        Ok(released)
    }

    fn get_catalog_item(
        &self,
        file_id: i64,
        version: &str,
    ) -> StorageResult<Option<CatalogItem>> {
        let sql = format!(
            "SELECT {} FROM catalog_items WHERE file_id = ?1 AND version = ?2",
            CATALOG_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![file_id, version], row_to_catalog_item)
            .optional()?)
    }

    fn list_catalog_items(
        &self,
        version: &str,
        status: Option<CatalogStatus>,
    ) -> StorageResult<Vec<CatalogItem>> {
        let sql = format!(
            "SELECT {} FROM catalog_items
             WHERE version = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY file_id ASC",
            CATALOG_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(
                params![version, status.map(|s| s.to_db_string())],
                row_to_catalog_item,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn count_catalog_by_status(
        &self,
        version: &str,
    ) -> StorageResult<HashMap<CatalogStatus, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM catalog_items WHERE version = ?1 GROUP BY status",
        )?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map(params![version], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status_str, count) = row?;
            if let Some(status) = CatalogStatus::from_db_string(&status_str) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now_ts(), config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                row_to_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                row_to_run,
            )
            .optional()?)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now_ts(), run_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_file(url: &str, hash: Option<&str>, site: &str) -> NewFileRecord {
        NewFileRecord {
            url: url.to_string(),
            content_hash: hash.map(|h| h.to_string()),
            local_path: Some(format!("/tmp/{}", url.len())),
            site_name: site.to_string(),
            bytes: 10,
            ..Default::default()
        }
    }

    fn seeded(n: usize) -> SqliteStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for i in 0..n {
            let url = format!("https://example.com/{}.pdf", i);
            let hash = format!("hash{}", i);
            storage.insert_file(&new_file(&url, Some(&hash), "Example")).unwrap();
        }
        storage
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let outcome = storage
            .insert_file(&new_file("https://example.com/a.pdf", Some("aaa"), "Example"))
            .unwrap();
        assert!(outcome.is_inserted());

        let by_url = storage.get_by_url("https://example.com/a.pdf").unwrap().unwrap();
        let by_hash = storage.get_by_hash("aaa").unwrap().unwrap();
        assert_eq!(by_url, by_hash);
        assert_eq!(by_url.id, outcome.file_id());
    }

    #[test]
    fn test_duplicate_url_and_hash() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first = storage
            .insert_file(&new_file("https://example.com/a.pdf", Some("same"), "Example"))
            .unwrap();

        let again = storage
            .insert_file(&new_file("https://example.com/a.pdf", Some("other"), "Example"))
            .unwrap();
        assert_eq!(again, InsertOutcome::DuplicateUrl(first.file_id()));

        let mirror = storage
            .insert_file(&new_file("https://mirror.com/copy.pdf", Some("same"), "Mirror"))
            .unwrap();
        assert_eq!(mirror, InsertOutcome::DuplicateHash(first.file_id()));

        assert_eq!(storage.count_files().unwrap(), 1);
    }

    #[test]
    fn test_null_hashes_are_not_duplicates() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage
            .insert_file(&new_file("https://example.com/1", None, "Example"))
            .unwrap()
            .is_inserted());
        assert!(storage
            .insert_file(&new_file("https://example.com/2", None, "Example"))
            .unwrap()
            .is_inserted());
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let mut storage = seeded(3);
        assert_eq!(storage.enqueue_version("v1").unwrap(), 3);
        assert_eq!(storage.enqueue_version("v1").unwrap(), 0);
        assert_eq!(storage.enqueue_version("v2").unwrap(), 3);
    }

    #[test]
    fn test_enqueue_skips_files_without_local_path() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let mut record = new_file("https://example.com/gone.pdf", Some("g"), "Example");
        record.local_path = None;
        storage.insert_file(&record).unwrap();

        assert_eq!(storage.enqueue_version("v1").unwrap(), 0);
    }

    #[test]
    fn test_claim_order_and_limit() {
        let mut storage = seeded(5);
        storage.enqueue_version("v1").unwrap();

        let pending = storage.get_pending_catalog_items("v1", 10).unwrap();
        let ids: Vec<i64> = pending.iter().map(|i| i.file_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let first = storage.claim_pending("v1", 2, &[]).unwrap();
        let second = storage.claim_pending("v1", 2, &[]).unwrap();
        assert_eq!(first.iter().map(|i| i.file_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(second.iter().map(|i| i.file_id).collect::<Vec<_>>(), vec![3, 4]);

        let counts = storage.count_catalog_by_status("v1").unwrap();
        assert_eq!(counts.get(&CatalogStatus::Processing), Some(&4));
        assert_eq!(counts.get(&CatalogStatus::Pending), Some(&1));
    }

    #[test]
    fn test_claim_with_site_filter() {
        let mut storage = seeded(2);
        storage
            .insert_file(&new_file("https://soa.org/x.pdf", Some("soa"), "SOA Research"))
            .unwrap();
        storage.enqueue_version("v1").unwrap();

        let claimed = storage
            .claim_pending("v1", 10, &["soa".to_string()])
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].site_name, "SOA Research");
    }

    #[test]
    fn test_upsert_never_duplicates() {
        let mut storage = seeded(1);
        storage.enqueue_version("v1").unwrap();
        storage.claim_pending("v1", 1, &[]).unwrap();

        let item = CatalogItem::ok(1, "v1", "AI".into(), "summary".into(), vec!["llm".into()]);
        storage.upsert_catalog_item(&item).unwrap();
        storage.upsert_catalog_item(&item).unwrap();

        let items = storage.list_catalog_items("v1", None).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, CatalogStatus::Ok);
        assert_eq!(items[0].keywords, vec!["llm".to_string()]);
    }

    #[test]
    fn test_release_claims_only_touches_processing() {
        let mut storage = seeded(2);
        storage.enqueue_version("v1").unwrap();
        storage.claim_pending("v1", 2, &[]).unwrap();
        storage
            .upsert_catalog_item(&CatalogItem::skipped(2, "v1", vec![]))
            .unwrap();

        assert_eq!(storage.release_claims("v1", &[1, 2]).unwrap(), 1);
        let item = storage.get_catalog_item(2, "v1").unwrap().unwrap();
        assert_eq!(item.status, CatalogStatus::Skipped);
        let item = storage.get_catalog_item(1, "v1").unwrap().unwrap();
        assert_eq!(item.status, CatalogStatus::Pending);
    }

    #[test]
    fn test_reset_errors() {
        let mut storage = seeded(2);
        storage.enqueue_version("v1").unwrap();
        storage.claim_pending("v1", 2, &[]).unwrap();
        storage
            .upsert_catalog_item(&CatalogItem::error(1, "v1", "boom"))
            .unwrap();

        assert_eq!(storage.reset_errors("v1").unwrap(), 1);
        let item = storage.get_catalog_item(1, "v1").unwrap().unwrap();
        assert_eq!(item.status, CatalogStatus::Pending);
        assert!(item.error_message.is_none());
    }

    #[test]
    fn test_release_stale_claims() {
        let mut storage = seeded(1);
        storage.enqueue_version("v1").unwrap();
        storage.claim_pending("v1", 1, &[]).unwrap();

        assert_eq!(
            storage
                .release_stale_claims("v1", Duration::from_secs(3600))
                .unwrap(),
            0
        );
        assert_eq!(
            storage.release_stale_claims("v1", Duration::ZERO).unwrap(),
            1
        );
    }

    #[test]
    fn test_pages_and_runs() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .mark_page_seen("https://example.com/", "Example", VisitState::Visiting)
            .unwrap();
        storage
            .mark_page_seen("https://example.com/", "Example", VisitState::Followed)
            .unwrap();
        assert_eq!(storage.count_pages().unwrap(), 1);

        let run_id = storage.create_run("hash").unwrap();
        storage.finish_run(run_id, RunStatus::Interrupted).unwrap();
        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Interrupted);
        assert!(run.finished_at.is_some());
        assert!(matches!(
            storage.get_run(run_id + 1),
            Err(StorageError::RunNotFound(_))
        ));
    }

    #[test]
    fn test_held_write_lock_surfaces_as_conflict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let mut storage = SqliteStorage::new(&path).unwrap();
        storage
            .insert_file(&new_file("https://example.com/a.pdf", Some("a"), "Example"))
            .unwrap();

        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();

        storage.set_busy_timeout(Duration::ZERO).unwrap();
        let result = storage.upsert_catalog_item(&CatalogItem::error(1, "v1", "x"));
        assert!(matches!(result, Err(ref e) if e.is_write_conflict()));

        blocker.execute_batch("ROLLBACK;").unwrap();
        storage.set_busy_timeout(BUSY_TIMEOUT).unwrap();
        assert!(storage
            .upsert_catalog_item(&CatalogItem::error(1, "v1", "x"))
            .is_ok());
    }

    #[test]
    fn test_concurrent_writers_one_connection_each() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            for i in 0..8 {
                let url = format!("https://example.com/{}.pdf", i);
                storage
                    .insert_file(&new_file(&url, Some(&url), "Example"))
                    .unwrap();
            }
            storage.enqueue_version("v1").unwrap();
        }

        let handles: Vec<_> = (1..=8)
            .map(|file_id| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut storage = SqliteStorage::new(&path).unwrap();
                    storage
                        .upsert_catalog_item(&CatalogItem::skipped(file_id, "v1", vec![]))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        let counts = storage.count_catalog_by_status("v1").unwrap();
        assert_eq!(counts.get(&CatalogStatus::Skipped), Some(&8));
    }
}
