//! Configuration module for Doc-Harvester
//!
//! This module handles loading, parsing and validating TOML configuration
//! files, and resolving each configured site into an immutable [`SiteRule`].
//!
//! # Example
//!
//! ```no_run
//! use doc_harvester::config::{load_config, resolve_site_rules, SiteOverrides};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! for rule in resolve_site_rules(&config, &SiteOverrides::default()) {
//!     println!("{} -> max depth {}", rule.name, rule.max_depth);
//! }
//! ```

mod parser;
mod resolve;
mod types;
mod validation;

// Re-export types
pub use types::{CatalogConfig, Config, DefaultsConfig, PathsConfig, SiteEntry};
pub use types::{DEFAULT_CATALOG_VERSION, DEFAULT_FILE_EXTS};

pub use resolve::{resolve_site_rules, split_filter, SiteOverrides, SiteRule};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
