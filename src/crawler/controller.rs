//! Crawl controller - per-site crawl orchestration
//!
//! This module contains the crawl loop that coordinates:
//! - Seeding the frontier from the sitemap or the site root
//! - Fetching pages within the page and depth budgets
//! - Admitting file links and downloading them through temp files
//! - Deduplicating against the content store by URL and content hash
//! - Cooperative cancellation and run bookkeeping

use crate::config::{Config, SiteRule};
use crate::crawler::fetcher::{
    build_http_client, cleanup_stale_parts, download_file, fetch_page, FetchError, STALE_PART_AGE,
};
use crate::crawler::frontier::{Frontier, QueuedPage};
use crate::crawler::parser::{parse_page, parse_sitemap, ParsedPage};
use crate::filter::{
    admit, check_exclusion, file_link_wanted, follow_page, is_file_candidate, page_is_relevant,
    Admission, RejectReason,
};
use crate::progress::{Phase, RunContext};
use crate::state::VisitState;
use crate::storage::{open_storage, ContentStore, InsertOutcome, NewFileRecord, RunStatus};
use crate::url::{
    extension_of, filename_from_url, host_dir_name, normalize_url, same_site, sanitize_filename,
    unique_path,
};
use crate::Result;
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Per-site counts reported at the end of a crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub site: String,
    /// Page fetches attempted (counts against `max_pages`)
    pub visited: usize,
    /// New files stored
    pub downloaded: usize,
    /// Files whose bytes were already stored under another URL
    pub deduplicated: usize,
    /// Pages or files turned away by exclusion or extension rules
    pub excluded: usize,
    /// Links not pursued: already stored, off-site, keyword-irrelevant
    pub skipped: usize,
    /// Fetches or downloads that failed after retries
    pub failed: usize,
    pub cancelled: bool,
}

impl CrawlReport {
    fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Stored(_) => self.downloaded += 1,
            FileOutcome::AlreadyStored(_) => self.skipped += 1,
            FileOutcome::Duplicate(_) => self.deduplicated += 1,
            FileOutcome::Excluded(_) => self.excluded += 1,
            FileOutcome::Failed(_) => self.failed += 1,
            FileOutcome::Cancelled => self.cancelled = true,
        }
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: visited={} downloaded={} deduplicated={} excluded={} skipped={} failed={}{}",
            self.site,
            self.visited,
            self.downloaded,
            self.deduplicated,
            self.excluded,
            self.skipped,
            self.failed,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// What happened to one file link
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// New record with this file id
    Stored(i64),
    /// The URL was already in the store; nothing was downloaded
    AlreadyStored(i64),
    /// Identical bytes were already stored under this file id
    Duplicate(i64),
    /// Rejected before or after download; downloaded bytes were discarded
    Excluded(RejectReason),
    Failed(String),
    Cancelled,
}

/// Context of the page a file link was found on
#[derive(Debug, Clone, Default)]
struct SourcePage {
    url: Option<String>,
    title: Option<String>,
    published_time: Option<String>,
}

impl SourcePage {
    fn from_parsed(url: &Url, parsed: &ParsedPage) -> Self {
        Self {
            url: Some(url.to_string()),
            title: parsed.title.clone(),
            published_time: parsed.published_time.clone(),
        }
    }
}

/// Crawls sites one at a time against a content store
pub struct Crawler<S: ContentStore> {
    storage: S,
    client: Client,
    download_dir: PathBuf,
    ctx: RunContext,
}

impl<S: ContentStore> Crawler<S> {
    /// Creates a crawler and removes stale temporary downloads
    pub fn new(storage: S, client: Client, download_dir: impl Into<PathBuf>, ctx: RunContext) -> Self {
        let download_dir = download_dir.into();
        cleanup_stale_parts(&download_dir, STALE_PART_AGE);
        Self {
            storage,
            client,
            download_dir,
            ctx,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Breadth-first crawl of one site within its budgets
    ///
    /// Single-URL failures are counted and skipped; only store failures
    /// abort the crawl.
    pub async fn crawl_site(&mut self, rule: &SiteRule) -> Result<CrawlReport> {
        let mut report = CrawlReport::new(&rule.name);
        let root = normalize_url(&rule.url)?;

        info!(
            "Starting crawl of site: {} (max_pages={}, max_depth={})",
            rule.name, rule.max_pages, rule.max_depth
        );

        let mut frontier = Frontier::new();
        let seeds = if rule.use_sitemap {
            self.load_sitemap(rule).await
        } else {
            Vec::new()
        };
        if seeds.is_empty() {
            frontier.push(root.clone(), 0);
        } else {
            for seed in seeds.into_iter().take(rule.max_pages) {
                frontier.push(seed, 0);
            }
        }

        while let Some(page) = frontier.pop() {
            if self.ctx.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if report.visited >= rule.max_pages {
                debug!("Page budget of {} exhausted for {}", rule.max_pages, rule.name);
                break;
            }
            if page.depth > rule.max_depth {
                frontier.mark(&page.url, VisitState::Rejected);
                continue;
            }
            if !same_site(&root, &page.url) {
                frontier.mark(&page.url, VisitState::Rejected);
                report.skipped += 1;
                continue;
            }
            if let Some(reason) = check_exclusion(page.url.as_str(), rule) {
                debug!("Skipping page {} ({})", page.url, reason);
                frontier.mark(&page.url, VisitState::Rejected);
                report.excluded += 1;
                continue;
            }

            report.visited += 1;
            self.ctx.report(
                Phase::Crawl,
                report.visited,
                rule.max_pages,
                format!("{}: {}", rule.name, page.url),
            );

            if is_file_candidate(&page.url, rule) {
                let outcome = self.handle_file(&page.url, &SourcePage::default(), rule).await?;
                frontier.mark(&page.url, visit_state_for(&outcome));
                report.record(&outcome);
                self.pause(rule.delay).await;
                continue;
            }

            self.visit_page(&mut frontier, &page, &root, rule, &mut report)
                .await?;
            self.pause(rule.delay).await;
        }

        if self.ctx.is_cancelled() {
            report.cancelled = true;
            info!("Crawl of {} stopped by cancellation", rule.name);
        }

        info!("Crawl completed: {}", report);
        Ok(report)
    }

    /// Fetches one URL and stores its admitted file links without following pages
    ///
    /// A URL that is itself a file is downloaded directly.
    pub async fn scan_page(&mut self, url: &str, rule: &SiteRule) -> Result<CrawlReport> {
        let mut report = CrawlReport::new(&rule.name);
        let url = normalize_url(url)?;

        if let Some(reason) = check_exclusion(url.as_str(), rule) {
            debug!("Skipping page {} ({})", url, reason);
            report.excluded += 1;
            return Ok(report);
        }

        if is_file_candidate(&url, rule) {
            let outcome = self.handle_file(&url, &SourcePage::default(), rule).await?;
            report.record(&outcome);
            return Ok(report);
        }

        let fetched = match fetch_page(&self.client, &url, &self.ctx).await {
            Ok(fetched) => fetched,
            Err(FetchError::Cancelled) => {
                report.cancelled = true;
                return Ok(report);
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", url, e);
                report.failed += 1;
                return Ok(report);
            }
        };
        report.visited += 1;

        let final_url = normalize_url(fetched.final_url.as_str())?;
        let parsed = parse_page(&fetched.body, &final_url);
        if let Some(title) = &parsed.title {
            if check_exclusion(title, rule).is_some() {
                report.excluded += 1;
                return Ok(report);
            }
        }

        let relevant = page_is_relevant(&page_text(&parsed), rule);
        let source = SourcePage::from_parsed(&final_url, &parsed);
        let mut frontier = Frontier::new();
        for link in &parsed.links {
            if !is_file_candidate(&link.url, rule) || !frontier.claim(&link.url) {
                continue;
            }
            if !file_link_wanted(&link.url, &link.anchor_text, relevant, rule) {
                report.skipped += 1;
                continue;
            }
            let outcome = self.handle_file(&link.url, &source, rule).await?;
            report.record(&outcome);
            if outcome == FileOutcome::Cancelled {
                break;
            }
        }

        Ok(report)
    }

    async fn visit_page(
        &mut self,
        frontier: &mut Frontier,
        page: &QueuedPage,
        root: &Url,
        rule: &SiteRule,
        report: &mut CrawlReport,
    ) -> Result<()> {
        let fetched = match fetch_page(&self.client, &page.url, &self.ctx).await {
            Ok(fetched) => fetched,
            Err(FetchError::Cancelled) => {
                report.cancelled = true;
                return Ok(());
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", page.url, e);
                report.failed += 1;
                frontier.mark(&page.url, VisitState::Rejected);
                self.storage
                    .mark_page_seen(page.url.as_str(), &rule.name, VisitState::Rejected)?;
                return Ok(());
            }
        };

        let final_url = normalize_url(fetched.final_url.as_str())?;
        if !same_site(root, &final_url) {
            debug!("{} redirected off-site to {}", page.url, final_url);
            frontier.mark(&page.url, VisitState::Rejected);
            report.skipped += 1;
            return Ok(());
        }
        let redirected = final_url != page.url;
        if redirected && !frontier.adopt(&final_url) {
            debug!("{} redirected to {}, already visited", page.url, final_url);
            frontier.mark(&page.url, VisitState::Rejected);
            report.skipped += 1;
            return Ok(());
        }
        let settle = |frontier: &mut Frontier, state: VisitState| {
            frontier.mark(&page.url, state);
            if redirected {
                frontier.mark(&final_url, state);
            }
        };

        if let Some(reason) = check_exclusion(final_url.as_str(), rule) {
            debug!("Skipping page {} after redirect ({})", final_url, reason);
            settle(frontier, VisitState::Rejected);
            report.excluded += 1;
            return Ok(());
        }
        if is_file_candidate(&final_url, rule) {
            let outcome = self.handle_file(&final_url, &SourcePage::default(), rule).await?;
            settle(frontier, visit_state_for(&outcome));
            report.record(&outcome);
            return Ok(());
        }

        self.storage
            .mark_page_seen(final_url.as_str(), &rule.name, VisitState::Followed)?;
        if !fetched.is_html() {
            debug!("{} is {}, not following", final_url, fetched.content_type);
            settle(frontier, VisitState::Followed);
            return Ok(());
        }

        let parsed = parse_page(&fetched.body, &final_url);
        let relevant = page_is_relevant(&page_text(&parsed), rule);
        let source = SourcePage::from_parsed(&final_url, &parsed);
        debug!(
            "Parsed {} ({} links, relevant={})",
            final_url,
            parsed.links.len(),
            relevant
        );

        for link in &parsed.links {
            if frontier.is_seen(&link.url) {
                continue;
            }

            if is_file_candidate(&link.url, rule) {
                frontier.claim(&link.url);
                if !file_link_wanted(&link.url, &link.anchor_text, relevant, rule) {
                    frontier.mark(&link.url, VisitState::Rejected);
                    report.skipped += 1;
                    continue;
                }
                let outcome = self.handle_file(&link.url, &source, rule).await?;
                frontier.mark(&link.url, visit_state_for(&outcome));
                report.record(&outcome);
                if outcome == FileOutcome::Cancelled {
                    break;
                }
            } else if page.depth < rule.max_depth
                && same_site(root, &link.url)
                && follow_page(&link.url, &link.anchor_text, relevant, rule)
            {
                frontier.push(link.url.clone(), page.depth + 1);
            }
        }

        settle(frontier, VisitState::Followed);
        Ok(())
    }

    /// Admits, downloads, re-checks and registers one file
    async fn handle_file(
        &mut self,
        url: &Url,
        source: &SourcePage,
        rule: &SiteRule,
    ) -> Result<FileOutcome> {
        if self.ctx.is_cancelled() {
            return Ok(FileOutcome::Cancelled);
        }
        if let Admission::Reject(reason) = admit(url.as_str(), rule) {
            debug!("Rejected {} ({})", url, reason);
            return Ok(FileOutcome::Excluded(reason));
        }
        if let Some(existing) = self.storage.get_by_url(url.as_str())? {
            debug!("Already stored: {}", url);
            return Ok(FileOutcome::AlreadyStored(existing.id));
        }

        let target_dir = self.download_dir.join(host_dir_name(url));
        self.ctx
            .report(Phase::Download, 0, 0, format!("{}: {}", rule.name, url));
        let download =
            match download_file(&self.client, url, &target_dir.join("_tmp"), &self.ctx).await {
                Ok(download) => download,
                Err(FetchError::Cancelled) => return Ok(FileOutcome::Cancelled),
                Err(e) => {
                    warn!("Failed to download {}: {}", url, e);
                    return Ok(FileOutcome::Failed(e.to_string()));
                }
            };

        let final_url = normalize_url(download.final_url.as_str())?;
        let original_filename = download
            .disposition_name
            .clone()
            .or_else(|| filename_from_url(&final_url));

        // Redirects and Content-Disposition can rename the file.
        if let Some(reason) = check_exclusion(final_url.as_str(), rule) {
            info!("Excluding {} based on final URL ({})", final_url, reason);
            return Ok(FileOutcome::Excluded(reason));
        }
        let resolved = original_filename
            .clone()
            .unwrap_or_else(|| final_url.to_string());
        if let Admission::Reject(reason) = admit(&resolved, rule) {
            info!("Excluding {} based on resolved name {} ({})", final_url, resolved, reason);
            return Ok(FileOutcome::Excluded(reason));
        }

        if final_url != *url {
            if let Some(existing) = self.storage.get_by_url(final_url.as_str())? {
                return Ok(FileOutcome::AlreadyStored(existing.id));
            }
        }
        if let Some(existing) = self.storage.get_by_hash(&download.sha256)? {
            info!(
                "Dropping {} (SHA-256 {} already stored as file {})",
                final_url, download.sha256, existing.id
            );
            return Ok(FileOutcome::Duplicate(existing.id));
        }

        let ext = extension_of(&resolved).unwrap_or_else(|| ".bin".to_string());
        let name = original_filename
            .clone()
            .unwrap_or_else(|| format!("{}{}", download.sha256, ext));
        let dest = unique_path(&target_dir, &sanitize_filename(&name, Some(&ext)));

        let record = NewFileRecord {
            url: final_url.to_string(),
            content_hash: Some(download.sha256.clone()),
            local_path: Some(dest.to_string_lossy().into_owned()),
            site_name: rule.name.clone(),
            title: source.title.clone().or_else(|| original_filename.clone()),
            original_filename: original_filename.clone(),
            source_page_url: source.url.clone(),
            bytes: download.bytes as i64,
            content_type: download.content_type.clone(),
            published_time: source.published_time.clone(),
        };
        let bytes = download.bytes;
        download.temp.persist(&dest)?;

        let outcome = match self.storage.insert_file(&record) {
            Ok(outcome) => outcome,
            Err(e) => {
                discard(&dest);
                return Err(e.into());
            }
        };

        Ok(match outcome {
            InsertOutcome::Inserted(id) => {
                info!("Saved file: {} ({} bytes) -> {}", final_url, bytes, dest.display());
                FileOutcome::Stored(id)
            }
            InsertOutcome::DuplicateUrl(id) => {
                discard(&dest);
                FileOutcome::AlreadyStored(id)
            }
            InsertOutcome::DuplicateHash(id) => {
                discard(&dest);
                FileOutcome::Duplicate(id)
            }
        })
    }

    async fn load_sitemap(&self, rule: &SiteRule) -> Vec<Url> {
        let sitemap = format!("{}/sitemap.xml", rule.url.trim_end_matches('/'));
        let Ok(sitemap_url) = Url::parse(&sitemap) else {
            return Vec::new();
        };

        match fetch_page(&self.client, &sitemap_url, &self.ctx).await {
            Ok(fetched) => {
                let urls: Vec<Url> = parse_sitemap(&fetched.body)
                    .iter()
                    .filter_map(|loc| normalize_url(loc).ok())
                    .collect();
                if !urls.is_empty() {
                    info!("Loaded {} URLs from sitemap: {}", urls.len(), sitemap_url);
                }
                urls
            }
            Err(e) => {
                debug!("No sitemap at {}: {}", sitemap_url, e);
                Vec::new()
            }
        }
    }

    /// Sleeps for the politeness delay, waking early on cancellation
    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.ctx.token().cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Crawls every rule in order, recording the run in the store
///
/// Returns one report per site that was started. A cancelled run is marked
/// `interrupted`; a store failure marks it `failed` and is returned.
pub async fn run_update(
    config: &Config,
    config_hash: &str,
    rules: &[SiteRule],
    ctx: &RunContext,
) -> Result<Vec<CrawlReport>> {
    let storage = open_storage(Path::new(&config.paths.database))?;
    let client = build_http_client(&config.defaults.user_agent)?;
    let mut crawler = Crawler::new(storage, client, &config.paths.download_dir, ctx.clone());

    let run_id = crawler.storage_mut().create_run(config_hash)?;
    info!("Starting crawl run {} over {} site(s)", run_id, rules.len());

    let mut reports = Vec::new();
    for rule in rules {
        if ctx.is_cancelled() {
            break;
        }
        match crawler.crawl_site(rule).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!("Crawl of {} failed: {}", rule.name, e);
                crawler.storage_mut().finish_run(run_id, RunStatus::Failed)?;
                return Err(e);
            }
        }
    }

    let status = if ctx.is_cancelled() {
        RunStatus::Interrupted
    } else {
        RunStatus::Completed
    };
    crawler.storage_mut().finish_run(run_id, status)?;

    Ok(reports)
}

fn page_text(parsed: &ParsedPage) -> String {
    match &parsed.title {
        Some(title) => format!("{} {}", title, parsed.text),
        None => parsed.text.clone(),
    }
}

fn visit_state_for(outcome: &FileOutcome) -> VisitState {
    match outcome {
        FileOutcome::Stored(_) => VisitState::FileAdmitted,
        _ => VisitState::Rejected,
    }
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}
