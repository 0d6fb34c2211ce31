//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end against a temporary database.

use doc_harvester::config::{
    CatalogConfig, Config, DefaultsConfig, PathsConfig, SiteEntry, SiteRule,
};
use doc_harvester::crawler::{build_http_client, run_update, Crawler};
use doc_harvester::progress::RunContext;
use doc_harvester::storage::{ContentStore, RunStatus, SqliteStorage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_BYTES: &[u8] = b"%PDF-1.4 annual report";

/// Resolves a site rooted at the mock server, without sitemap or delay
fn site_rule(base_url: &str, exclude_keywords: &[&str]) -> SiteRule {
    let defaults = DefaultsConfig {
        delay_seconds: 0.0,
        use_sitemap: false,
        exclude_keywords: exclude_keywords.iter().map(|s| s.to_string()).collect(),
        ..DefaultsConfig::default()
    };
    let entry = SiteEntry {
        name: "TestSite".to_string(),
        url: format!("{}/", base_url),
        ..Default::default()
    };
    SiteRule::resolve(&entry, &defaults)
}

fn crawler(dir: &TempDir, ctx: RunContext) -> Crawler<SqliteStorage> {
    let storage = SqliteStorage::new(&dir.path().join("harvest.db")).expect("open db");
    let client = build_http_client("doc-harvester-test/1.0").expect("client");
    Crawler::new(storage, client, dir.path().join("downloads"), ctx)
}

/// `set_body_string` would force `text/plain` over any content-type header
fn html_response(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into().into_bytes(), "text/html")
}

async fn mount_html(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(html_response(body))
        .mount(server)
        .await;
}

fn pdf_response(bytes: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_bytes(bytes.to_vec())
        .insert_header("content-type", "application/pdf")
}

/// Stored files under the downloads tree, ignoring the temp directory
fn stored_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(hosts) = std::fs::read_dir(root) else {
        return files;
    };
    for host in hosts.flatten() {
        for entry in std::fs::read_dir(host.path()).unwrap().flatten() {
            if entry.path().is_file() {
                files.push(entry.path());
            }
        }
    }
    files
}

#[tokio::test]
async fn test_admitted_file_stored_and_excluded_file_never_fetched() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<html><head><title>Publications</title></head><body>
            <a href="/docs/report.pdf">Annual report</a>
            <a href="/docs/exam_2024.pdf">Exam paper</a>
        </body></html>"#
            .to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/docs/report.pdf"))
        .respond_with(pdf_response(PDF_BYTES))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/exam_2024.pdf"))
        .respond_with(pdf_response(b"exam"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let report = crawler
        .crawl_site(&site_rule(&base, &["exam"]))
        .await
        .expect("crawl");

    assert_eq!(report.visited, 1);
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.excluded, 1);

    let storage = crawler.storage();
    assert_eq!(storage.count_files().unwrap(), 1);
    let record = storage
        .get_by_url(&format!("{}/docs/report.pdf", base))
        .unwrap()
        .expect("record");
    assert_eq!(record.title.as_deref(), Some("Publications"));
    assert_eq!(record.original_filename.as_deref(), Some("report.pdf"));
    assert_eq!(record.bytes, PDF_BYTES.len() as i64);
    assert_eq!(
        std::fs::read(record.local_path.unwrap()).unwrap(),
        PDF_BYTES
    );
}

#[tokio::test]
async fn test_identical_bytes_at_two_urls_stored_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<a href="/a/report.pdf">A</a><a href="/b/copy.pdf">B</a>"#.to_string(),
    )
    .await;
    for at in ["/a/report.pdf", "/b/copy.pdf"] {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(pdf_response(PDF_BYTES))
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let report = crawler.crawl_site(&site_rule(&base, &[])).await.unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.deduplicated, 1);
    assert_eq!(crawler.storage().count_files().unwrap(), 1);
    assert!(crawler
        .storage()
        .get_by_url(&format!("{}/b/copy.pdf", base))
        .unwrap()
        .is_none());
    assert_eq!(stored_files(&dir.path().join("downloads")).len(), 1);
}

#[tokio::test]
async fn test_content_disposition_name_excluded_after_download() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<a href="/download/file.pdf">Download</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/download/file.pdf"))
        .respond_with(
            pdf_response(PDF_BYTES).insert_header(
                "content-disposition",
                r#"attachment; filename="exam_answers.pdf""#,
            ),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let report = crawler
        .crawl_site(&site_rule(&base, &["exam"]))
        .await
        .unwrap();

    assert_eq!(report.downloaded, 0);
    assert_eq!(report.excluded, 1);
    assert_eq!(crawler.storage().count_files().unwrap(), 0);
    assert!(stored_files(&dir.path().join("downloads")).is_empty());
}

#[tokio::test]
async fn test_file_link_redirected_to_html_page_not_stored() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<a href="/docs/report.pdf">Report</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/docs/report.pdf"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/login.html"))
        .mount(&server)
        .await;
    mount_html(&server, "/login.html", "<html>Sign in</html>".to_string()).await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let report = crawler.crawl_site(&site_rule(&base, &[])).await.unwrap();

    assert_eq!(report.downloaded, 0);
    assert_eq!(report.excluded, 1);
    assert_eq!(crawler.storage().count_files().unwrap(), 0);
    assert!(stored_files(&dir.path().join("downloads")).is_empty());
}

#[tokio::test]
async fn test_content_disposition_with_disallowed_extension_not_stored() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<a href="/files/tool.pdf">Tool</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/tool.pdf"))
        .respond_with(
            pdf_response(PDF_BYTES)
                .insert_header("content-disposition", r#"attachment; filename="setup.exe""#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let report = crawler.crawl_site(&site_rule(&base, &[])).await.unwrap();

    assert_eq!(report.downloaded, 0);
    assert_eq!(report.excluded, 1);
    assert_eq!(crawler.storage().count_files().unwrap(), 0);
    assert!(stored_files(&dir.path().join("downloads")).is_empty());
}

#[tokio::test]
async fn test_failed_download_does_not_stop_crawl() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<a href="/missing.pdf">Gone</a><a href="/present.pdf">Here</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/missing.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/present.pdf"))
        .respond_with(pdf_response(PDF_BYTES))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let report = crawler.crawl_site(&site_rule(&base, &[])).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.downloaded, 1);
}

#[tokio::test]
async fn test_page_budget_limits_fetches() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(&server, "/", r#"<a href="/one">One</a>"#.to_string()).await;
    mount_html(&server, "/one", r#"<a href="/two">Two</a>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/two"))
        .respond_with(html_response("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let mut rule = site_rule(&base, &[]);
    rule.max_pages = 2;
    let report = crawler.crawl_site(&rule).await.unwrap();

    assert_eq!(report.visited, 2);
    assert_eq!(crawler.storage().count_pages().unwrap(), 2);
}

#[tokio::test]
async fn test_redirect_target_fetched_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<a href="/a">A</a> <a href="/b">B</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/b"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_response(r#"<a href="/b/notes.pdf">Notes</a>"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b/notes.pdf"))
        .respond_with(pdf_response(PDF_BYTES))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let report = crawler.crawl_site(&site_rule(&base, &[])).await.unwrap();

    assert_eq!(report.visited, 2);
    assert_eq!(report.downloaded, 1);
    let fetched_b = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/b")
        .count();
    assert_eq!(fetched_b, 1);
}

#[tokio::test]
async fn test_depth_budget_stops_following() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(&server, "/", r#"<a href="/one">One</a>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/one"))
        .respond_with(html_response("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let mut rule = site_rule(&base, &[]);
    rule.max_depth = 0;
    let report = crawler.crawl_site(&rule).await.unwrap();

    assert_eq!(report.visited, 1);
}

#[tokio::test]
async fn test_sitemap_seeds_frontier() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<?xml version="1.0"?><urlset><url><loc>{}/library</loc></url></urlset>"#,
            base
        )))
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/library",
        r#"<a href="/library/notes.pdf">Notes</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/library/notes.pdf"))
        .respond_with(pdf_response(PDF_BYTES))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let mut rule = site_rule(&base, &[]);
    rule.use_sitemap = true;
    let report = crawler.crawl_site(&rule).await.unwrap();

    assert_eq!(report.visited, 1);
    assert_eq!(report.downloaded, 1);
}

#[tokio::test]
async fn test_missing_sitemap_falls_back_to_root() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_html(&server, "/", "<html><body>Home</body></html>".to_string()).await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let mut rule = site_rule(&base, &[]);
    rule.use_sitemap = true;
    let report = crawler.crawl_site(&rule).await.unwrap();

    assert_eq!(report.visited, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn test_second_crawl_skips_stored_urls() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<a href="/report.pdf">Report</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(pdf_response(PDF_BYTES))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let rule = site_rule(&base, &[]);
    let first = crawler(&dir, RunContext::new())
        .crawl_site(&rule)
        .await
        .unwrap();
    assert_eq!(first.downloaded, 1);

    let mut again = crawler(&dir, RunContext::new());
    let second = again.crawl_site(&rule).await.unwrap();
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(again.storage().count_files().unwrap(), 1);
}

#[tokio::test]
async fn test_cancelled_crawl_fetches_nothing() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .respond_with(html_response("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    ctx.cancel();
    let mut crawler = crawler(&dir, ctx);
    let report = crawler.crawl_site(&site_rule(&base, &[])).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.visited, 0);
}

#[tokio::test]
async fn test_scan_page_collects_files_without_following() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/search",
        r#"<title>Results</title>
           <a href="/hit.pdf">Hit</a>
           <a href="/next-page">Next</a>"#
            .to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/hit.pdf"))
        .respond_with(pdf_response(PDF_BYTES))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next-page"))
        .respond_with(html_response("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut crawler = crawler(&dir, RunContext::new());
    let report = crawler
        .scan_page(&format!("{}/search?q=risk", base), &site_rule(&base, &[]))
        .await
        .unwrap();

    assert_eq!(report.visited, 1);
    assert_eq!(report.downloaded, 1);
    let record = crawler
        .storage()
        .get_by_url(&format!("{}/hit.pdf", base))
        .unwrap()
        .unwrap();
    assert_eq!(record.title.as_deref(), Some("Results"));
}

#[tokio::test]
async fn test_run_update_records_run() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<a href="/report.pdf">Report</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(pdf_response(PDF_BYTES))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let rule = site_rule(&base, &[]);
    let config = Config {
        paths: PathsConfig {
            database: db.to_string_lossy().to_string(),
            download_dir: dir.path().join("downloads").to_string_lossy().to_string(),
            catalog_jsonl: None,
            catalog_md: None,
        },
        defaults: DefaultsConfig::default(),
        sites: Vec::new(),
        catalog: CatalogConfig::default(),
    };

    let reports = run_update(&config, "cfg-hash", &[rule], &RunContext::new())
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].downloaded, 1);

    let storage = SqliteStorage::new(&db).unwrap();
    let run = storage.get_latest_run().unwrap().expect("run");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "cfg-hash");
    assert!(run.finished_at.is_some());
}
