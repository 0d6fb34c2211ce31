//! File index export
//!
//! Writes every stored file, joined with its catalog result for one
//! version, as JSON lines or as a Markdown table.

use crate::catalog::markdown_cell;
use crate::storage::{CatalogItem, ContentStore, FileRecord, StorageResult};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Output format of `export`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    JsonLines,
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "json" => Ok(Self::JsonLines),
            "md" | "markdown" => Ok(Self::Markdown),
            other => Err(format!("unknown export format: {} (use jsonl or md)", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JsonLines => write!(f, "jsonl"),
            Self::Markdown => write!(f, "md"),
        }
    }
}

/// One row of the file index
#[derive(Debug, Clone, Serialize)]
pub struct ExportRecord {
    pub id: i64,
    pub url: String,
    pub site_name: String,
    pub title: Option<String>,
    pub original_filename: Option<String>,
    pub source_page_url: Option<String>,
    pub local_path: Option<String>,
    pub content_hash: Option<String>,
    pub bytes: i64,
    pub content_type: Option<String>,
    pub published_time: Option<String>,
    pub discovered_at: String,
    pub catalog_status: Option<String>,
    pub category: Option<String>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
}

impl ExportRecord {
    fn new(file: FileRecord, item: Option<CatalogItem>) -> Self {
        let (catalog_status, category, keywords, summary) = match item {
            Some(item) => (
                Some(item.status.to_db_string().to_string()),
                item.category,
                item.keywords,
                item.summary,
            ),
            None => (None, None, Vec::new(), None),
        };

        Self {
            id: file.id,
            url: file.url,
            site_name: file.site_name,
            title: file.title,
            original_filename: file.original_filename,
            source_page_url: file.source_page_url,
            local_path: file.local_path,
            content_hash: file.content_hash,
            bytes: file.bytes,
            content_type: file.content_type,
            published_time: file.published_time,
            discovered_at: file.discovered_at,
            catalog_status,
            category,
            keywords,
            summary,
        }
    }
}

/// Loads the index in file id order, optionally for one site
pub fn collect_records(
    storage: &dyn ContentStore,
    version: &str,
    site_name: Option<&str>,
) -> StorageResult<Vec<ExportRecord>> {
    let mut items: HashMap<i64, CatalogItem> = storage
        .list_catalog_items(version, None)?
        .into_iter()
        .map(|item| (item.file_id, item))
        .collect();

    Ok(storage
        .list_files(site_name)?
        .into_iter()
        .map(|file| {
            let item = items.remove(&file.id);
            ExportRecord::new(file, item)
        })
        .collect())
}

/// Writes records in the given format
pub fn write_records<W: Write>(
    records: &[ExportRecord],
    format: ExportFormat,
    out: &mut W,
) -> io::Result<()> {
    match format {
        ExportFormat::JsonLines => {
            for record in records {
                serde_json::to_writer(&mut *out, record)?;
                writeln!(out)?;
            }
        }
        ExportFormat::Markdown => {
            writeln!(out, "# Document Index\n")?;
            writeln!(out, "{} file(s)\n", records.len())?;
            writeln!(
                out,
                "| id | site | title | filename | category | keywords | url | local_path |"
            )?;
            writeln!(out, "|---|---|---|---|---|---|---|---|")?;
            for r in records {
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} | {} | {} |",
                    r.id,
                    markdown_cell(&r.site_name),
                    markdown_cell(r.title.as_deref().unwrap_or("")),
                    markdown_cell(r.original_filename.as_deref().unwrap_or("")),
                    markdown_cell(r.category.as_deref().unwrap_or("")),
                    markdown_cell(&r.keywords.join(", ")),
                    markdown_cell(&r.url),
                    markdown_cell(r.local_path.as_deref().unwrap_or("")),
                )?;
            }
        }
    }
    out.flush()
}

/// Exports the index to a file and returns the number of records written
pub fn export_to_path(
    storage: &dyn ContentStore,
    version: &str,
    site_name: Option<&str>,
    format: ExportFormat,
    path: &Path,
) -> crate::Result<usize> {
    let records = collect_records(storage, version, site_name)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    write_records(&records, format, &mut out)?;

    Ok(records.len())
}
