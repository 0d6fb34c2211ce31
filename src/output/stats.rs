//! Statistics from the harvest database
//!
//! This module collects file, page, catalog and run counts from the
//! content store and renders them for the `stats` command.

use crate::state::CatalogStatus;
use crate::storage::{ContentStore, RunRecord, StorageResult};
use std::collections::HashMap;
use std::fmt::Write;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored files
    pub total_files: u64,

    /// Stored files per site, sorted by site name
    pub files_by_site: Vec<(String, u64)>,

    /// Pages visited across all crawls
    pub pages_seen: u64,

    /// Catalog version the status counts refer to
    pub catalog_version: String,

    /// Catalog items by status
    pub catalog_by_status: HashMap<CatalogStatus, u64>,

    /// Most recent crawl run, if any
    pub last_run: Option<RunRecord>,
}

impl HarvestStatistics {
    pub fn catalog_count(&self, status: CatalogStatus) -> u64 {
        self.catalog_by_status.get(&status).copied().unwrap_or(0)
    }

    /// Share of stored files with a terminal catalog status, in percent
    pub fn catalog_coverage(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        let done: u64 = CatalogStatus::all_statuses()
            .into_iter()
            .filter(CatalogStatus::is_terminal)
            .map(|s| self.catalog_count(s))
            .sum();
        (done as f64 / self.total_files as f64) * 100.0
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn ContentStore, version: &str) -> StorageResult<HarvestStatistics> {
    Ok(HarvestStatistics {
        total_files: storage.count_files()?,
        files_by_site: storage.count_files_by_site()?,
        pages_seen: storage.count_pages()?,
        catalog_version: version.to_string(),
        catalog_by_status: storage.count_catalog_by_status(version)?,
        last_run: storage.get_latest_run()?,
    })
}

/// Renders statistics as the plain-text report printed by `stats`
pub fn format_statistics(stats: &HarvestStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Harvest Statistics ===\n");

    let _ = writeln!(out, "Files:");
    let _ = writeln!(out, "  Total stored: {}", stats.total_files);
    let _ = writeln!(out, "  Pages visited: {}", stats.pages_seen);
    for (site, count) in &stats.files_by_site {
        let _ = writeln!(out, "  {}: {}", site, count);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Catalog ({}):", stats.catalog_version);
    for status in CatalogStatus::all_statuses() {
        let count = stats.catalog_count(status);
        if count > 0 {
            let _ = writeln!(out, "  {}: {}", status, count);
        }
    }
    let _ = writeln!(out, "  Coverage: {:.1}%", stats.catalog_coverage());
    let _ = writeln!(out);

    match &stats.last_run {
        Some(run) => {
            let _ = writeln!(out, "Last crawl run: #{} ({})", run.id, run.status.to_db_string());
            let _ = writeln!(out, "  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                let _ = writeln!(out, "  Finished: {}", finished);
            }
        }
        None => {
            let _ = writeln!(out, "No crawl runs recorded");
        }
    }

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &HarvestStatistics) {
    print!("{}", format_statistics(stats));
}
