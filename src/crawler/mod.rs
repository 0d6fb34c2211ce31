//! Crawler module for site traversal and document ingestion
//!
//! This module contains the crawl side of the pipeline, including:
//! - HTTP fetching with retry logic and streamed, hashed downloads
//! - HTML parsing, link and metadata extraction, sitemap parsing
//! - The breadth-first frontier
//! - Per-site crawl control and run bookkeeping

mod controller;
mod fetcher;
mod frontier;
mod parser;

pub use controller::{run_update, CrawlReport, Crawler, FileOutcome};
pub use fetcher::{
    build_http_client, cleanup_stale_parts, download_file, fetch_page, DownloadedFile, FetchError,
    FetchedPage, TempDownload, MAX_ATTEMPTS, STALE_PART_AGE,
};
pub use frontier::{Frontier, QueuedPage};
pub use parser::{parse_page, parse_sitemap, parse_text, PageLink, ParsedPage};
