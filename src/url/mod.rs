//! URL handling module for Doc-Harvester
//!
//! This module provides URL normalization, link resolution, same-site checks
//! and the filename rules used when documents are written to disk.

mod domain;
mod filename;
mod normalize;

pub use domain::{extract_domain, host_dir_name, same_site, site_authority};
pub use filename::{
    extension_of, filename_from_content_disposition, filename_from_url, sanitize_filename,
    unique_path,
};
pub use normalize::{normalize_url, resolve_link};
