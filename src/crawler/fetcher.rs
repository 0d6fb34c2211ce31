//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests to fetch page content
//! - Streaming file downloads into temporary `.part` files with SHA-256
//! - Retry logic for transient failures
//! - Error classification

use crate::progress::RunContext;
use reqwest::{header, redirect::Policy, Client, Response, StatusCode};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Attempts per URL before a transient failure is reported
pub const MAX_ATTEMPTS: u32 = 3;

/// Base pause between attempts; grows linearly with the attempt number
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Temporary downloads older than this are removed at startup
pub const STALE_PART_AGE: Duration = Duration::from_secs(24 * 60 * 60);

static NEXT_PART: AtomicU64 = AtomicU64::new(0);

/// Errors produced while fetching a URL
#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts, connection failures, 5xx and 429 responses
    #[error("transient failure: {0}")]
    Transient(String),

    /// Anything retrying will not fix (4xx, malformed responses)
    #[error("{0}")]
    Permanent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_body() || err.is_request() {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

/// A fetched HTML (or other text) page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,
    pub status_code: u16,
    pub content_type: String,
    pub body: String,
}

impl FetchedPage {
    /// True for HTML responses, servers that omit the header, and mislabeled
    /// bodies that start like an HTML document
    pub fn is_html(&self) -> bool {
        self.content_type.is_empty()
            || self.content_type.contains("html")
            || looks_like_html(&self.body)
    }
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(64)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.starts_with("<head")
}

/// A downloaded file waiting in its temporary location
#[derive(Debug)]
pub struct DownloadedFile {
    pub final_url: Url,
    pub content_type: Option<String>,
    /// Filename announced by `Content-Disposition`, if any
    pub disposition_name: Option<String>,
    pub sha256: String,
    pub bytes: u64,
    pub temp: TempDownload,
}

/// A `.part` file that is deleted on drop unless persisted
#[derive(Debug)]
pub struct TempDownload {
    path: PathBuf,
    persisted: bool,
}

impl TempDownload {
    fn new(tmp_dir: &Path) -> Self {
        let n = NEXT_PART.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self {
            path: tmp_dir.join(format!("download_{}_{}_{}.part", std::process::id(), nanos, n)),
            persisted: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the bytes to their final location
    pub fn persist(mut self, dest: &Path) -> std::io::Result<()> {
        std::fs::rename(&self.path, dest)?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempDownload {
    fn drop(&mut self) {
        if !self.persisted && self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use doc_harvester::crawler::build_http_client;
///
/// let client = build_http_client("DocHarvester/1.0").unwrap();
/// ```
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page, retrying transient failures
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 5xx / 429 | Retry up to `MAX_ATTEMPTS` times |
/// | Timeout / connection error | Retry up to `MAX_ATTEMPTS` times |
/// | Other HTTP 4xx | Immediate failure |
/// | Cancellation | Checked before every attempt |
pub async fn fetch_page(
    client: &Client,
    url: &Url,
    ctx: &RunContext,
) -> Result<FetchedPage, FetchError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_fetch_page(client, url, ctx).await {
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                pause_before_retry(url, attempt, &e, ctx).await;
            }
            result => return result,
        }
    }
}

/// Streams a file into `tmp_dir`, hashing it on the way
///
/// The temporary file is removed automatically if the download fails, is
/// cancelled, or the returned [`DownloadedFile`] is dropped without being
/// persisted.
pub async fn download_file(
    client: &Client,
    url: &Url,
    tmp_dir: &Path,
    ctx: &RunContext,
) -> Result<DownloadedFile, FetchError> {
    tokio::fs::create_dir_all(tmp_dir).await?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_download(client, url, tmp_dir, ctx).await {
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                pause_before_retry(url, attempt, &e, ctx).await;
            }
            result => return result,
        }
    }
}

/// Removes `.part` files older than `max_age` from `<download_dir>/*/_tmp`
///
/// Returns the number of files removed.
pub fn cleanup_stale_parts(download_dir: &Path, max_age: Duration) -> usize {
    let Ok(hosts) = std::fs::read_dir(download_dir) else {
        return 0;
    };
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for host in hosts.flatten() {
        let Ok(parts) = std::fs::read_dir(host.path().join("_tmp")) else {
            continue;
        };
        for part in parts.flatten() {
            let path = part.path();
            if path.extension().and_then(|e| e.to_str()) != Some("part") {
                continue;
            }
            let stale = part
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if stale && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
    }

    if removed > 0 {
        tracing::info!("Cleaned up {} stale temporary files", removed);
    }
    removed
}

async fn try_fetch_page(
    client: &Client,
    url: &Url,
    ctx: &RunContext,
) -> Result<FetchedPage, FetchError> {
    let response = send(client, url, ctx).await?;
    let status_code = response.status().as_u16();
    let final_url = response.url().clone();
    let content_type = header_value(&response, header::CONTENT_TYPE).unwrap_or_default();

    let body = response.text().await.map_err(FetchError::from_reqwest)?;

    Ok(FetchedPage {
        final_url,
        status_code,
        content_type,
        body,
    })
}

async fn try_download(
    client: &Client,
    url: &Url,
    tmp_dir: &Path,
    ctx: &RunContext,
) -> Result<DownloadedFile, FetchError> {
    let mut response = send(client, url, ctx).await?;
    let final_url = response.url().clone();
    let content_type = header_value(&response, header::CONTENT_TYPE);
    let disposition_name = header_value(&response, header::CONTENT_DISPOSITION)
        .and_then(|h| crate::url::filename_from_content_disposition(&h));

    let temp = TempDownload::new(tmp_dir);
    let mut file = tokio::fs::File::create(temp.path()).await?;
    let mut hasher = Sha256::new();
    let mut bytes = 0u64;

    while let Some(chunk) = response.chunk().await.map_err(FetchError::from_reqwest)? {
        if ctx.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    tracing::debug!("Downloaded {} ({} bytes)", final_url, bytes);

    Ok(DownloadedFile {
        final_url,
        content_type,
        disposition_name,
        sha256: hex::encode(hasher.finalize()),
        bytes,
        temp,
    })
}

async fn send(client: &Client, url: &Url, ctx: &RunContext) -> Result<Response, FetchError> {
    if ctx.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(FetchError::from_reqwest)?;

    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(FetchError::Transient(format!("HTTP {}", status.as_u16())))
    } else {
        Err(FetchError::Permanent(format!("HTTP {}", status.as_u16())))
    }
}

async fn pause_before_retry(url: &Url, attempt: u32, err: &FetchError, ctx: &RunContext) {
    tracing::warn!(
        "Attempt {}/{} for {} failed: {}",
        attempt,
        MAX_ATTEMPTS,
        url,
        err
    );
    tokio::select! {
        _ = ctx.token().cancelled() => {}
        _ = tokio::time::sleep(RETRY_BACKOFF * attempt) => {}
    }
}

fn header_value(response: &Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
