//! State module for tracking crawl and catalog progress
//!
//! # Components
//!
//! - `VisitState`: per-URL state during one crawl run (queued, visiting, followed, ...)
//! - `CatalogStatus`: per-file extraction state under one catalog version

mod catalog_status;
mod visit_state;

// Re-export main types
pub use catalog_status::CatalogStatus;
pub use visit_state::VisitState;
