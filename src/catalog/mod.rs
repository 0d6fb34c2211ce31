//! Catalog side of the pipeline
//!
//! - Text extraction behind the [`Extractor`] seam
//! - Relevance, keywords, category and summary behind the [`Classifier`] seam
//! - The claiming worker pool that writes results back ([`CatalogProcessor`])
//! - Append-only JSON lines and Markdown outputs

mod classify;
mod extract;
mod output;
mod processor;

pub use classify::{
    categorize, extract_keywords, summarize, Classification, Classifier, KeywordClassifier,
    OTHER_CATEGORY, SUMMARY_SENTENCES, TOP_KEYWORDS,
};
pub use extract::{trim_semantic, Extracted, ExtractionError, Extractor, TextExtractor};
pub use output::{CatalogEntry, CatalogSink};
pub use processor::{
    run_catalog, CatalogOptions, CatalogProcessor, CatalogReport, DEFAULT_STALE_AFTER,
};

pub(crate) use output::markdown_cell;
