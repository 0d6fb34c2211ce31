//! Text extraction seam
//!
//! Real format extractors (PDF, Office) live outside this crate and plug in
//! through [`Extractor`]. The built-in [`TextExtractor`] handles plain text
//! and HTML so a catalog run works end to end without them.

use crate::crawler::parse_text;
use crate::url::extension_of;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Per-file extraction failure; never fatal to a batch
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("empty extracted text")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Text and metadata pulled out of one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub title: Option<String>,
    pub date: Option<String>,
}

/// Turns a stored file into text
///
/// Implementations are called from blocking worker threads.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Extracted, ExtractionError>;
}

/// Reads `.txt`, `.md`, `.csv`, `.html` and `.htm` files
#[derive(Debug, Clone)]
pub struct TextExtractor {
    max_chars: usize,
}

impl TextExtractor {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Extractor for TextExtractor {
    fn extract(&self, path: &Path) -> Result<Extracted, ExtractionError> {
        if !path.exists() {
            return Err(ExtractionError::NotFound(path.to_path_buf()));
        }

        let name = path.to_string_lossy();
        let ext = extension_of(&name).unwrap_or_default();
        let raw = || -> Result<String, ExtractionError> {
            Ok(String::from_utf8_lossy(&std::fs::read(path)?).into_owned())
        };

        let extracted = match ext.as_str() {
            ".txt" | ".md" | ".csv" => Extracted {
                text: raw()?,
                ..Default::default()
            },
            ".html" | ".htm" => {
                let page = parse_text(&raw()?);
                Extracted {
                    text: page.text,
                    title: page.title,
                    date: page.published_time,
                }
            }
            "" => return Err(ExtractionError::Unsupported("(no extension)".to_string())),
            other => return Err(ExtractionError::Unsupported(other.to_string())),
        };

        let text = trim_semantic(&extracted.text, self.max_chars);
        if text.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }

        Ok(Extracted { text, ..extracted })
    }
}

/// Truncates to `max_chars` characters, preferring a sentence boundary
///
/// ```
/// use doc_harvester::catalog::trim_semantic;
///
/// assert_eq!(trim_semantic("One. Two. Three", 11), "One. Two.");
/// assert_eq!(trim_semantic("short", 100), "short");
/// ```
pub fn trim_semantic(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let chunk = &text[..cut];

    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let boundary = RE
        .get_or_init(|| Regex::new(r"[.!?。！？]\s").ok())
        .as_ref()
        .and_then(|re| re.find_iter(chunk).last());

    match boundary {
        Some(m) => {
            let end = m.start() + chunk[m.start()..].chars().next().map_or(1, char::len_utf8);
            chunk[..end].trim().to_string()
        }
        None => chunk.trim_end().to_string(),
    }
}
