//! Resolution of configured sites into immutable per-run rules

use crate::config::types::{Config, DefaultsConfig, SiteEntry};
use std::time::Duration;

/// Fully resolved crawl rules for one site
///
/// Built once per run from `[defaults]` and the site's own overrides.
/// Keywords, exclusions and extensions are lower-cased, and extensions carry
/// a leading dot, so admission decisions never re-normalize.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRule {
    pub name: String,
    pub url: String,
    pub max_pages: usize,
    pub max_depth: u32,
    pub delay: Duration,
    pub keywords: Vec<String>,
    pub file_exts: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub exclude_prefixes: Vec<String>,
    pub use_sitemap: bool,
}

impl SiteRule {
    /// Merges a site entry with the global defaults
    pub fn resolve(entry: &SiteEntry, defaults: &DefaultsConfig) -> Self {
        let keywords = entry.keywords.as_ref().unwrap_or(&defaults.keywords);
        let file_exts: Vec<String> = entry
            .file_exts
            .as_ref()
            .unwrap_or(&defaults.file_exts)
            .iter()
            .map(|ext| normalize_ext(ext))
            .collect();

        Self {
            name: entry.name.clone(),
            url: entry.url.clone(),
            max_pages: entry.max_pages.unwrap_or(defaults.max_pages),
            max_depth: entry.max_depth.unwrap_or(defaults.max_depth),
            delay: delay_from_secs(entry.delay_seconds.unwrap_or(defaults.delay_seconds)),
            keywords: lowercase_unique(keywords.iter()),
            file_exts: lowercase_unique(file_exts.iter()),
            exclude_keywords: lowercase_unique(
                defaults.exclude_keywords.iter().chain(&entry.exclude_keywords),
            ),
            exclude_prefixes: lowercase_unique(
                defaults.exclude_prefixes.iter().chain(&entry.exclude_prefixes),
            ),
            use_sitemap: entry.use_sitemap.unwrap_or(defaults.use_sitemap),
        }
    }

    /// True when the site has include-keywords configured
    pub fn filters_by_keyword(&self) -> bool {
        !self.keywords.is_empty()
    }
}

/// Command-line overrides applied on top of every resolved site
#[derive(Debug, Clone, Default)]
pub struct SiteOverrides {
    /// Comma-separated tokens matched against site name or URL
    pub site_filter: Option<String>,
    pub max_pages: Option<usize>,
    pub max_depth: Option<u32>,
}

/// Resolves all configured sites, applying the site filter and overrides
pub fn resolve_site_rules(config: &Config, overrides: &SiteOverrides) -> Vec<SiteRule> {
    let tokens = split_filter(overrides.site_filter.as_deref());

    config
        .sites
        .iter()
        .filter(|site| site_matches(site, &tokens))
        .map(|site| {
            let mut rule = SiteRule::resolve(site, &config.defaults);
            if let Some(max_pages) = overrides.max_pages {
                rule.max_pages = max_pages;
            }
            if let Some(max_depth) = overrides.max_depth {
                rule.max_depth = max_depth;
            }
            rule
        })
        .collect()
}

/// Splits a comma-separated site filter into lower-cased tokens
pub fn split_filter(filter: Option<&str>) -> Vec<String> {
    filter
        .map(|f| {
            f.split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn site_matches(site: &SiteEntry, tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return true;
    }
    let name = site.name.to_lowercase();
    let url = site.url.to_lowercase();
    tokens.iter().any(|t| name.contains(t) || url.contains(t))
}

fn normalize_ext(ext: &str) -> String {
    let ext = ext.trim();
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

fn lowercase_unique<'a, I>(items: I) -> Vec<String>
where
    I: Iterator<Item = &'a String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim().to_lowercase();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn delay_from_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}
