use crate::config::types::{CatalogConfig, Config, DefaultsConfig, PathsConfig, SiteEntry};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_paths(&config.paths)?;
    validate_defaults(&config.defaults)?;
    validate_sites(&config.sites)?;
    validate_catalog(&config.catalog)?;
    Ok(())
}

fn validate_paths(paths: &PathsConfig) -> Result<(), ConfigError> {
    if paths.database.is_empty() {
        return Err(ConfigError::Validation(
            "database path cannot be empty".to_string(),
        ));
    }

    if paths.download_dir.is_empty() {
        return Err(ConfigError::Validation(
            "download-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_defaults(defaults: &DefaultsConfig) -> Result<(), ConfigError> {
    if defaults.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    validate_budget("defaults", defaults.max_pages, defaults.delay_seconds)?;

    if defaults.file_exts.is_empty() {
        return Err(ConfigError::Validation(
            "file-exts must list at least one extension".to_string(),
        ));
    }

    Ok(())
}

fn validate_sites(sites: &[SiteEntry]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for site in sites {
        if site.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Site with url '{}' must have a name",
                site.url
            )));
        }

        if !names.insert(site.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate site name '{}'",
                site.name
            )));
        }

        let url = Url::parse(&site.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid site URL '{}': {}", site.url, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Site URL '{}' must use http or https",
                site.url
            )));
        }

        if let Some(max_pages) = site.max_pages {
            validate_budget(&site.name, max_pages, site.delay_seconds.unwrap_or(0.0))?;
        } else if let Some(delay) = site.delay_seconds {
            validate_budget(&site.name, 1, delay)?;
        }

        if matches!(&site.file_exts, Some(exts) if exts.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "Site '{}' overrides file-exts with an empty list",
                site.name
            )));
        }
    }

    Ok(())
}

fn validate_budget(scope: &str, max_pages: usize, delay_seconds: f64) -> Result<(), ConfigError> {
    if max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "{}: max-pages must be >= 1, got {}",
            scope, max_pages
        )));
    }

    if !delay_seconds.is_finite() || delay_seconds < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{}: delay-seconds must be a non-negative number, got {}",
            scope, delay_seconds
        )));
    }

    Ok(())
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    if catalog.version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "catalog version cannot be empty".to_string(),
        ));
    }

    if catalog.workers < 1 || catalog.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "catalog workers must be between 1 and 64, got {}",
            catalog.workers
        )));
    }

    if catalog.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "catalog batch-size must be >= 1, got {}",
            catalog.batch_size
        )));
    }

    if catalog.max_chars < 1 {
        return Err(ConfigError::Validation(
            "catalog max-chars must be >= 1".to_string(),
        ));
    }

    Ok(())
}
