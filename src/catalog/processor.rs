//! Catalog processor
//!
//! Turns pending catalog items into terminal states. Items are claimed in
//! ascending file id order, handed to a bounded pool of blocking workers as
//! immutable [`ClaimedItem`] snapshots, and each worker commits its own
//! result through its own connection.
//!
//! Cancellation never strands an item in `processing`: undispatched claims
//! and workers that observe cancellation before committing put their items
//! back to `pending`.

use crate::catalog::classify::{summarize, Classifier, KeywordClassifier, SUMMARY_SENTENCES};
use crate::catalog::extract::{ExtractionError, Extractor, TextExtractor};
use crate::catalog::output::{CatalogEntry, CatalogSink};
use crate::config::{CatalogConfig, Config};
use crate::progress::{Phase, RunContext};
use crate::state::CatalogStatus;
use crate::storage::{
    open_storage, CatalogItem, ClaimedItem, ContentStore, SqliteStorage, StorageError,
    StorageResult,
};
use crate::{HarvestError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Claims older than this are assumed to belong to a dead process
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30 * 60);

/// Settings for one catalog invocation
#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub version: String,
    /// Concurrent extraction workers
    pub workers: usize,
    /// Rows claimed per round trip
    pub batch_size: usize,
    /// Upper bound on items claimed by this invocation
    pub limit: Option<usize>,
    /// Site name tokens; empty means every site
    pub site_filter: Vec<String>,
    /// Move `error` items back to `pending` once, before claiming
    pub retry_errors: bool,
    pub stale_after: Duration,
}

impl CatalogOptions {
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self {
            version: config.version.clone(),
            workers: config.workers,
            batch_size: config.batch_size,
            limit: None,
            site_filter: Vec::new(),
            retry_errors: false,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// Counts for one catalog invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogReport {
    pub claimed: usize,
    pub ok: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Errors caused by a stored file that is gone from disk
    pub missing_files: usize,
    /// Claims handed back to `pending` unprocessed
    pub released: usize,
    /// Claims whose result could not be written or released; they stay
    /// `processing` until stale claim recovery
    pub unresolved: usize,
    /// `error` items moved back to `pending` by the retry flag
    pub requeued: usize,
    /// Abandoned `processing` items recovered at start-up
    pub stale_released: usize,
    pub cancelled: bool,
}

impl CatalogReport {
    /// Items that reached a terminal state in this invocation
    pub fn processed(&self) -> usize {
        self.ok + self.skipped + self.errors
    }
}

impl fmt::Display for CatalogReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "claimed={} ok={} skipped={} errors={} missing_files={}",
            self.claimed, self.ok, self.skipped, self.errors, self.missing_files
        )?;
        if self.unresolved > 0 {
            write!(f, " unresolved={}", self.unresolved)?;
        }
        if self.cancelled {
            write!(f, " (cancelled, {} released)", self.released)?;
        }
        Ok(())
    }
}

/// Drives extraction and classification over the catalog queue
pub struct CatalogProcessor {
    db_path: PathBuf,
    extractor: Arc<dyn Extractor>,
    classifier: Arc<dyn Classifier>,
    options: CatalogOptions,
    sink: CatalogSink,
}

impl CatalogProcessor {
    pub fn new(
        db_path: impl Into<PathBuf>,
        extractor: Arc<dyn Extractor>,
        classifier: Arc<dyn Classifier>,
        options: CatalogOptions,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            extractor,
            classifier,
            options,
            sink: CatalogSink::default(),
        }
    }

    /// Appends `ok` results of every batch to the given outputs
    pub fn with_sink(mut self, sink: CatalogSink) -> Self {
        self.sink = sink;
        self
    }

    /// Processes pending items until the queue, the limit or cancellation
    /// ends the run
    ///
    /// Per-item failures become `error` rows. A store failure other than a
    /// write conflict stops the run after in-flight workers finish.
    pub async fn run(&self, ctx: &RunContext) -> Result<CatalogReport> {
        let opts = &self.options;
        let mut report = CatalogReport::default();
        let mut store = open_storage(&self.db_path)?;

        report.stale_released = store.release_stale_claims(&opts.version, opts.stale_after)?;
        if report.stale_released > 0 {
            warn!(
                "Recovered {} stale claim(s) for {}",
                report.stale_released, opts.version
            );
        }

        let enqueued = store.enqueue_version(&opts.version)?;
        if opts.retry_errors {
            report.requeued = store.reset_errors(&opts.version)?;
            info!("Re-queued {} error item(s) for retry", report.requeued);
        }

        let counts = store.count_catalog_by_status(&opts.version)?;
        let pending = counts.get(&CatalogStatus::Pending).copied().unwrap_or(0) as usize;
        let total = opts.limit.map_or(pending, |limit| limit.min(pending));
        info!(
            "Catalog {}: {} new, {} pending, {} worker(s)",
            opts.version, enqueued, pending, opts.workers
        );

        let halt = ctx.token().child_token();
        let worker = Worker {
            db_path: self.db_path.clone(),
            extractor: Arc::clone(&self.extractor),
            classifier: Arc::clone(&self.classifier),
            halt: halt.clone(),
        };
        let semaphore = Arc::new(Semaphore::new(opts.workers.max(1)));
        let mut fatal: Option<HarvestError> = None;
        let mut done = 0;

        loop {
            if halt.is_cancelled() {
                break;
            }
            let batch_size = match opts.limit {
                Some(limit) => opts.batch_size.min(limit.saturating_sub(report.claimed)),
                None => opts.batch_size,
            };
            if batch_size == 0 {
                break;
            }

            let batch = store.claim_pending(&opts.version, batch_size, &opts.site_filter)?;
            if batch.is_empty() {
                break;
            }
            report.claimed += batch.len();
            debug!(
                "Claimed {} item(s), file ids {}..={}",
                batch.len(),
                batch[0].file_id,
                batch[batch.len() - 1].file_id
            );

            let mut handles = Vec::with_capacity(batch.len());
            let mut undispatched = Vec::new();
            for item in batch {
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) if !halt.is_cancelled() => permit,
                    _ => {
                        undispatched.push(item.file_id);
                        continue;
                    }
                };
                let worker = worker.clone();
                handles.push(tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    worker.process(item)
                }));
            }

            if !undispatched.is_empty() {
                report.released += store.release_claims(&opts.version, &undispatched)?;
            }

            let mut entries = Vec::new();
            for handle in handles {
                let outcome = match handle.await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        error!("Catalog store failure: {}", e);
                        fatal.get_or_insert(e.into());
                        continue;
                    }
                    Err(e) => {
                        error!("Catalog worker panicked: {}", e);
                        halt.cancel();
                        fatal.get_or_insert(e.into());
                        continue;
                    }
                };

                done += 1;
                match outcome {
                    ItemOutcome::Released => report.released += 1,
                    ItemOutcome::Unresolved => report.unresolved += 1,
                    ItemOutcome::Finished {
                        status,
                        missing,
                        label,
                        entry,
                    } => {
                        match status {
                            CatalogStatus::Ok => report.ok += 1,
                            CatalogStatus::Skipped => report.skipped += 1,
                            _ => report.errors += 1,
                        }
                        if missing {
                            report.missing_files += 1;
                        }
                        entries.extend(entry);
                        ctx.report(
                            Phase::Catalog,
                            done,
                            total,
                            format!("{} [{}]", label, status),
                        );
                    }
                }
            }

            if let Err(e) = self.sink.append(&entries) {
                warn!("Failed to append catalog output: {}", e);
            }
        }

        report.cancelled = ctx.is_cancelled();
        if let Some(e) = fatal {
            return Err(e);
        }

        info!("Catalog {} finished: {}", opts.version, report);
        Ok(report)
    }
}

/// What happened to one claimed item
#[derive(Debug)]
enum ItemOutcome {
    Finished {
        status: CatalogStatus,
        missing: bool,
        label: String,
        entry: Option<CatalogEntry>,
    },
    /// Not written; the item is `pending` again
    Released,
    /// Neither the result nor the release could be written
    Unresolved,
}

/// The writes a worker performs for its claimed item
trait ItemWriter {
    fn write(&mut self, item: &CatalogItem) -> StorageResult<()>;
    fn release(&mut self, version: &str, file_id: i64) -> StorageResult<usize>;
}

impl ItemWriter for SqliteStorage {
    fn write(&mut self, item: &CatalogItem) -> StorageResult<()> {
        self.upsert_catalog_item(item)
    }

    fn release(&mut self, version: &str, file_id: i64) -> StorageResult<usize> {
        self.release_claims(version, &[file_id])
    }
}

/// Result of evaluating one item, before it is written
struct Evaluation {
    item: CatalogItem,
    missing: bool,
}

/// Everything a blocking worker needs; cloned per item
#[derive(Clone)]
struct Worker {
    db_path: PathBuf,
    extractor: Arc<dyn Extractor>,
    classifier: Arc<dyn Classifier>,
    halt: CancellationToken,
}

impl Worker {
    fn process(&self, claimed: ClaimedItem) -> StorageResult<ItemOutcome> {
        let evaluation = self.evaluate(&claimed);

        let mut store = match SqliteStorage::new(&self.db_path) {
            Ok(store) => store,
            Err(e) => {
                self.halt.cancel();
                return Err(e);
            }
        };

        self.finish(&mut store, &claimed, evaluation)
    }

    /// Commits an evaluated item, or hands the claim back
    ///
    /// A write conflict is retried once; if it persists the item is recorded
    /// as `error` so the rest of the batch carries on.
    fn finish<W: ItemWriter>(
        &self,
        writer: &mut W,
        claimed: &ClaimedItem,
        evaluation: Evaluation,
    ) -> StorageResult<ItemOutcome> {
        if self.halt.is_cancelled() {
            writer.release(&claimed.version, claimed.file_id)?;
            return Ok(ItemOutcome::Released);
        }

        let status = match commit_with_retry(writer, &evaluation.item) {
            Ok(()) => evaluation.item.status,
            Err(e) if e.is_write_conflict() => {
                warn!("Giving up on file {} after write conflict: {}", claimed.file_id, e);
                let failed = CatalogItem::error(
                    claimed.file_id,
                    &claimed.version,
                    format!("write conflict: {}", e),
                );
                if let Err(write_err) = writer.write(&failed) {
                    warn!("Could not record error for file {}: {}", claimed.file_id, write_err);
                    return Ok(release_after_failure(writer, claimed));
                }
                CatalogStatus::Error
            }
            Err(e) => {
                self.halt.cancel();
                return Err(e);
            }
        };

        if let Some(message) = &evaluation.item.error_message {
            warn!("File {} failed: {}", claimed.file_id, message);
        }

        let entry = (status == CatalogStatus::Ok).then(|| entry_for(claimed, &evaluation.item));
        Ok(ItemOutcome::Finished {
            status,
            missing: evaluation.missing,
            label: label_for(claimed),
            entry,
        })
    }

    /// Extracts and classifies one file; never fails, errors become items
    fn evaluate(&self, claimed: &ClaimedItem) -> Evaluation {
        let (id, version) = (claimed.file_id, claimed.version.as_str());

        let Some(path) = claimed.local_path.as_deref() else {
            return Evaluation {
                item: CatalogItem::error(id, version, "File not found: no local path"),
                missing: true,
            };
        };

        let extracted = match self.extractor.extract(Path::new(path)) {
            Ok(extracted) => extracted,
            Err(e) => {
                return Evaluation {
                    missing: matches!(e, ExtractionError::NotFound(_)),
                    item: CatalogItem::error(id, version, e.to_string()),
                }
            }
        };

        let title = claimed.title.as_deref().or(extracted.title.as_deref());
        let classification = self.classifier.classify(&extracted.text, title);
        let item = if classification.relevant {
            let summary = summarize(&extracted.text, &classification.keywords, SUMMARY_SENTENCES);
            CatalogItem::ok(
                id,
                version,
                classification.category,
                summary,
                classification.keywords,
            )
        } else {
            CatalogItem::skipped(id, version, classification.keywords)
        };

        Evaluation {
            item,
            missing: false,
        }
    }
}

/// Writes a result, retrying exactly once on a write conflict
fn commit_with_retry<W: ItemWriter>(writer: &mut W, item: &CatalogItem) -> StorageResult<()> {
    match writer.write(item) {
        Err(StorageError::WriteConflict(msg)) => {
            debug!("Write conflict on file {}, retrying: {}", item.file_id, msg);
            writer.write(item)
        }
        other => other,
    }
}

fn release_after_failure<W: ItemWriter>(writer: &mut W, claimed: &ClaimedItem) -> ItemOutcome {
    match writer.release(&claimed.version, claimed.file_id) {
        Ok(_) => ItemOutcome::Released,
        Err(e) => {
            warn!(
                "Could not release file {}, left for stale claim recovery: {}",
                claimed.file_id, e
            );
            ItemOutcome::Unresolved
        }
    }
}

fn label_for(claimed: &ClaimedItem) -> String {
    claimed
        .title
        .clone()
        .or_else(|| claimed.original_filename.clone())
        .unwrap_or_else(|| claimed.url.clone())
}

fn entry_for(claimed: &ClaimedItem, item: &CatalogItem) -> CatalogEntry {
    CatalogEntry {
        file_id: claimed.file_id,
        version: claimed.version.clone(),
        site_name: claimed.site_name.clone(),
        title: claimed.title.clone(),
        original_filename: claimed.original_filename.clone(),
        url: claimed.url.clone(),
        local_path: claimed.local_path.clone(),
        category: item.category.clone().unwrap_or_default(),
        keywords: item.keywords.clone(),
        summary: item.summary.clone().unwrap_or_default(),
    }
}

/// Runs the catalog with the built-in extractor and classifier and the
/// outputs named in `[paths]`
pub async fn run_catalog(
    config: &Config,
    options: CatalogOptions,
    ctx: &RunContext,
) -> Result<CatalogReport> {
    let sink = CatalogSink::new(
        config.paths.catalog_jsonl.as_ref().map(PathBuf::from),
        config.paths.catalog_md.as_ref().map(PathBuf::from),
    );
    CatalogProcessor::new(
        &config.paths.database,
        Arc::new(TextExtractor::new(config.catalog.max_chars)),
        Arc::new(KeywordClassifier::new(&config.catalog.topic_keywords)),
        options,
    )
    .with_sink(sink)
    .run(ctx)
    .await
}
