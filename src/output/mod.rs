//! Output module for reports over the harvest database
//!
//! This module handles:
//! - Collecting and printing file, catalog and run statistics
//! - Exporting the file index as JSON lines or Markdown

mod export;
pub mod stats;

pub use export::{collect_records, export_to_path, write_records, ExportFormat, ExportRecord};
pub use stats::{format_statistics, load_statistics, print_statistics, HarvestStatistics};
