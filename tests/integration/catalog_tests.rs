//! Integration tests for the catalog processor
//!
//! Each test builds a temporary database of stored files and drives the
//! processor end to end through its worker pool.

use doc_harvester::catalog::{
    CatalogOptions, CatalogProcessor, CatalogReport, CatalogSink, Extracted, ExtractionError,
    Extractor, KeywordClassifier, TextExtractor,
};
use doc_harvester::config::CatalogConfig;
use doc_harvester::progress::RunContext;
use doc_harvester::storage::{ContentStore, NewFileRecord, SqliteStorage};
use doc_harvester::CatalogStatus;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const VERSION: &str = "catalog_test";

struct Harness {
    dir: TempDir,
    db: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("harvest.db");
        SqliteStorage::new(&db).unwrap();
        Self { dir, db }
    }

    /// Writes a document and registers it; returns the file id
    fn add(&self, site: &str, name: &str, content: &str) -> i64 {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        self.storage()
            .insert_file(&NewFileRecord {
                url: format!("https://{}.example.org/{}", site.to_lowercase(), name),
                content_hash: Some(format!("{}-{}", site, name)),
                local_path: Some(path.to_string_lossy().to_string()),
                site_name: site.to_string(),
                original_filename: Some(name.to_string()),
                bytes: content.len() as i64,
                ..Default::default()
            })
            .unwrap()
            .file_id()
    }

    fn storage(&self) -> SqliteStorage {
        SqliteStorage::new(&self.db).unwrap()
    }

    fn status(&self, file_id: i64) -> CatalogStatus {
        self.storage()
            .get_catalog_item(file_id, VERSION)
            .unwrap()
            .expect("catalog item")
            .status
    }

    fn count(&self, status: CatalogStatus) -> u64 {
        self.storage()
            .count_catalog_by_status(VERSION)
            .unwrap()
            .get(&status)
            .copied()
            .unwrap_or(0)
    }

    fn processor(&self, extractor: Arc<dyn Extractor>, options: CatalogOptions) -> CatalogProcessor {
        let topics = vec!["machine learning".to_string(), "reserving".to_string()];
        CatalogProcessor::new(
            &self.db,
            extractor,
            Arc::new(KeywordClassifier::new(&topics)),
            options,
        )
    }

    async fn run_text(&self, options: CatalogOptions) -> CatalogReport {
        self.processor(Arc::new(TextExtractor::new(20_000)), options)
            .run(&RunContext::new())
            .await
            .expect("catalog run")
    }
}

fn options(workers: usize, batch_size: usize) -> CatalogOptions {
    CatalogOptions::from_config(&CatalogConfig {
        version: VERSION.to_string(),
        workers,
        batch_size,
        ..CatalogConfig::default()
    })
}

const RELEVANT: &str = "Machine learning methods for claims reserving are maturing. \
    Insurers use gradient boosting to estimate IBNR reserves. \
    Reserving actuaries still validate every machine learning model.";

const OFF_TOPIC: &str = "The annual picnic will be held in the park this June. \
    Bring sandwiches and sunscreen for the whole family.";

/// Delegates to the text extractor and records the order files were seen in
struct RecordingExtractor {
    inner: TextExtractor,
    seen: Mutex<Vec<PathBuf>>,
}

impl Extractor for RecordingExtractor {
    fn extract(&self, path: &Path) -> Result<Extracted, ExtractionError> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        self.inner.extract(path)
    }
}

/// Fails once, then behaves like the text extractor
struct FlakyExtractor {
    failed: AtomicBool,
}

impl Extractor for FlakyExtractor {
    fn extract(&self, path: &Path) -> Result<Extracted, ExtractionError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(ExtractionError::Other("transient parser crash".to_string()));
        }
        TextExtractor::new(20_000).extract(path)
    }
}

/// Requests cancellation from inside the first extraction
struct CancellingExtractor {
    ctx: RunContext,
}

impl Extractor for CancellingExtractor {
    fn extract(&self, path: &Path) -> Result<Extracted, ExtractionError> {
        self.ctx.cancel();
        TextExtractor::new(20_000).extract(path)
    }
}

#[tokio::test]
async fn test_mixed_outcomes_then_idempotent_rerun() {
    let h = Harness::new();
    let relevant = h.add("SOA", "ml-reserving.txt", RELEVANT);
    let off_topic = h.add("SOA", "picnic.txt", OFF_TOPIC);
    let unsupported = h.add("SOA", "slides.pdf", "%PDF-1.4");
    let missing = h.add("SOA", "deleted.txt", RELEVANT);
    std::fs::remove_file(h.dir.path().join("deleted.txt")).unwrap();

    let report = h.run_text(options(3, 2)).await;
    assert_eq!(report.claimed, 4);
    assert_eq!(report.ok, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors, 2);
    assert_eq!(report.missing_files, 1);

    assert_eq!(h.status(relevant), CatalogStatus::Ok);
    assert_eq!(h.status(off_topic), CatalogStatus::Skipped);
    assert_eq!(h.status(unsupported), CatalogStatus::Error);
    assert_eq!(h.status(missing), CatalogStatus::Error);

    let item = h
        .storage()
        .get_catalog_item(relevant, VERSION)
        .unwrap()
        .unwrap();
    assert!(item.category.unwrap().contains("AI"));
    assert!(item.keywords.iter().any(|k| k == "reserving"));
    assert!(item.summary.unwrap().contains("Machine learning"));

    let missing_item = h.storage().get_catalog_item(missing, VERSION).unwrap().unwrap();
    assert!(missing_item
        .error_message
        .unwrap()
        .starts_with("File not found"));

    let again = h.run_text(options(3, 2)).await;
    assert_eq!(again.claimed, 0);
    assert_eq!(again.processed(), 0);
    assert_eq!(h.count(CatalogStatus::Processing), 0);
}

#[tokio::test]
async fn test_claims_in_ascending_id_order() {
    let h = Harness::new();
    let names: Vec<String> = (0..5).map(|i| format!("doc{}.txt", i)).collect();
    for name in &names {
        h.add("SOA", name, RELEVANT);
    }

    let extractor = Arc::new(RecordingExtractor {
        inner: TextExtractor::new(20_000),
        seen: Mutex::new(Vec::new()),
    });
    h.processor(extractor.clone(), options(1, 2))
        .run(&RunContext::new())
        .await
        .unwrap();

    let seen: Vec<String> = extractor
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(seen, names);
}

#[tokio::test]
async fn test_limit_bounds_one_invocation() {
    let h = Harness::new();
    let ids: Vec<i64> = (0..4)
        .map(|i| h.add("SOA", &format!("doc{}.txt", i), RELEVANT))
        .collect();

    let opts = CatalogOptions {
        limit: Some(3),
        ..options(2, 2)
    };
    let report = h.run_text(opts).await;
    assert_eq!(report.claimed, 3);
    assert_eq!(h.status(ids[3]), CatalogStatus::Pending);

    let rest = h.run_text(options(2, 2)).await;
    assert_eq!(rest.claimed, 1);
    assert_eq!(h.status(ids[3]), CatalogStatus::Ok);
}

#[tokio::test]
async fn test_retry_moves_error_to_one_terminal_state() {
    let h = Harness::new();
    let id = h.add("SOA", "flaky.txt", RELEVANT);

    let extractor = Arc::new(FlakyExtractor {
        failed: AtomicBool::new(false),
    });
    let first = h
        .processor(extractor.clone(), options(2, 10))
        .run(&RunContext::new())
        .await
        .unwrap();
    assert_eq!(first.errors, 1);
    assert_eq!(h.status(id), CatalogStatus::Error);

    // Without the retry flag an error item stays put
    let untouched = h
        .processor(extractor.clone(), options(2, 10))
        .run(&RunContext::new())
        .await
        .unwrap();
    assert_eq!(untouched.claimed, 0);

    let retry = CatalogOptions {
        retry_errors: true,
        ..options(2, 10)
    };
    let second = h
        .processor(extractor, retry)
        .run(&RunContext::new())
        .await
        .unwrap();
    assert_eq!(second.requeued, 1);
    assert_eq!(second.ok, 1);
    assert_eq!(h.status(id), CatalogStatus::Ok);
    assert_eq!(h.count(CatalogStatus::Processing), 0);
    assert_eq!(h.count(CatalogStatus::Pending), 0);
}

#[tokio::test]
async fn test_cancellation_returns_claims_to_pending() {
    let h = Harness::new();
    for i in 0..5 {
        h.add("SOA", &format!("doc{}.txt", i), RELEVANT);
    }

    let ctx = RunContext::new();
    let extractor = Arc::new(CancellingExtractor { ctx: ctx.clone() });
    let report = h
        .processor(extractor, options(1, 10))
        .run(&ctx)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.processed(), 0);
    assert_eq!(report.released, 5);
    assert_eq!(h.count(CatalogStatus::Processing), 0);
    assert_eq!(h.count(CatalogStatus::Pending), 5);

    // A fresh invocation picks everything up again
    let resumed = h.run_text(options(2, 10)).await;
    assert_eq!(resumed.ok, 5);
}

#[tokio::test]
async fn test_site_filter_restricts_claims() {
    let h = Harness::new();
    let soa = h.add("SOA", "soa.txt", RELEVANT);
    let ifoa = h.add("IFoA", "ifoa.txt", RELEVANT);

    let opts = CatalogOptions {
        site_filter: vec!["ifoa".to_string()],
        ..options(2, 10)
    };
    let report = h.run_text(opts).await;

    assert_eq!(report.claimed, 1);
    assert_eq!(h.status(ifoa), CatalogStatus::Ok);
    assert_eq!(h.status(soa), CatalogStatus::Pending);
}

#[tokio::test]
async fn test_racing_processors_claim_each_item_once() {
    let h = Harness::new();
    for i in 0..20 {
        h.add("SOA", &format!("doc{:02}.txt", i), RELEVANT);
    }

    let a = h.processor(Arc::new(TextExtractor::new(20_000)), options(4, 3));
    let b = h.processor(Arc::new(TextExtractor::new(20_000)), options(4, 3));
    let ctx = RunContext::new();
    let (ra, rb) = tokio::join!(a.run(&ctx), b.run(&ctx));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(ra.claimed + rb.claimed, 20);
    assert_eq!(ra.ok + rb.ok, 20);
    assert_eq!(h.count(CatalogStatus::Ok), 20);
    assert_eq!(h.count(CatalogStatus::Processing), 0);
}

#[tokio::test]
async fn test_outputs_appended_for_ok_items() {
    let h = Harness::new();
    h.add("SOA", "ml.txt", RELEVANT);
    h.add("SOA", "picnic.txt", OFF_TOPIC);

    let jsonl = h.dir.path().join("out/catalog.jsonl");
    let md = h.dir.path().join("out/catalog.md");
    h.processor(Arc::new(TextExtractor::new(20_000)), options(2, 10))
        .with_sink(CatalogSink::new(Some(jsonl.clone()), Some(md.clone())))
        .run(&RunContext::new())
        .await
        .unwrap();

    let lines = std::fs::read_to_string(&jsonl).unwrap();
    assert_eq!(lines.lines().count(), 1);
    let entry: serde_json::Value = serde_json::from_str(lines.trim()).unwrap();
    assert_eq!(entry["original_filename"], "ml.txt");
    assert_eq!(entry["version"], VERSION);

    let table = std::fs::read_to_string(&md).unwrap();
    assert!(table.starts_with("| category | source_site |"));
    assert!(table.contains("ml.txt"));
    assert!(!table.contains("picnic.txt"));
}
