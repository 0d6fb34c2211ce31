//! Append-only catalog outputs
//!
//! `ok` results are appended after each batch to a JSON lines file and a
//! Markdown table. Both files only ever grow; the table header is written
//! when the file is first created.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const MARKDOWN_COLUMNS: &[&str] = &[
    "category",
    "source_site",
    "title",
    "original_filename",
    "keywords",
    "summary",
    "url",
    "local_path",
];

/// One cataloged document as written to the outputs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub file_id: i64,
    pub version: String,
    pub site_name: String,
    pub title: Option<String>,
    pub original_filename: Option<String>,
    pub url: String,
    pub local_path: Option<String>,
    pub category: String,
    pub keywords: Vec<String>,
    pub summary: String,
}

impl CatalogEntry {
    fn markdown_row(&self) -> String {
        let keywords = self.keywords.join(", ");
        let cells = [
            self.category.as_str(),
            self.site_name.as_str(),
            self.title.as_deref().unwrap_or(""),
            self.original_filename.as_deref().unwrap_or(""),
            keywords.as_str(),
            self.summary.as_str(),
            self.url.as_str(),
            self.local_path.as_deref().unwrap_or(""),
        ]
        .map(markdown_cell);
        format!("| {} |", cells.join(" | "))
    }
}

/// Destinations for catalog results; either may be absent
#[derive(Debug, Clone, Default)]
pub struct CatalogSink {
    jsonl: Option<PathBuf>,
    markdown: Option<PathBuf>,
}

impl CatalogSink {
    pub fn new(jsonl: Option<PathBuf>, markdown: Option<PathBuf>) -> Self {
        Self { jsonl, markdown }
    }

    pub fn is_empty(&self) -> bool {
        self.jsonl.is_none() && self.markdown.is_none()
    }

    /// Appends entries to every configured output
    pub fn append(&self, entries: &[CatalogEntry]) -> io::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(path) = &self.jsonl {
            append_jsonl(path, entries)?;
        }
        if let Some(path) = &self.markdown {
            append_markdown(path, entries)?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn append_jsonl(path: &Path, entries: &[CatalogEntry]) -> io::Result<()> {
    let mut file = open_append(path)?;
    for entry in entries {
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{}", line)?;
    }
    Ok(())
}

fn append_markdown(path: &Path, entries: &[CatalogEntry]) -> io::Result<()> {
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let mut file = open_append(path)?;

    if is_new {
        writeln!(file, "| {} |", MARKDOWN_COLUMNS.join(" | "))?;
        writeln!(file, "|{}", "---|".repeat(MARKDOWN_COLUMNS.len()))?;
    }
    for entry in entries {
        writeln!(file, "{}", entry.markdown_row())?;
    }
    Ok(())
}

/// Keeps a value on one table row
pub(crate) fn markdown_cell(value: &str) -> String {
    value
        .replace('|', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
