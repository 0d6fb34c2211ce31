use serde::Deserialize;

pub const DEFAULT_USER_AGENT: &str = "doc-harvester/1.0 (+https://github.com/doc-harvester)";
pub const DEFAULT_MAX_PAGES: usize = 200;
pub const DEFAULT_MAX_DEPTH: u32 = 2;
pub const DEFAULT_DELAY_SECONDS: f64 = 0.5;
pub const DEFAULT_FILE_EXTS: &[&str] = &[".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx"];
pub const DEFAULT_CATALOG_VERSION: &str = "catalog_v1";
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_MAX_CHARS: usize = 20_000;

/// Main configuration structure for Doc-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Locations of persisted state and generated output
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Path to the SQLite database file
    pub database: String,

    /// Root directory for downloaded files (one subdirectory per host)
    #[serde(rename = "download-dir")]
    pub download_dir: String,

    /// JSON lines file that catalog results are appended to
    #[serde(rename = "catalog-jsonl", default)]
    pub catalog_jsonl: Option<String>,

    /// Markdown table that catalog results are appended to
    #[serde(rename = "catalog-md", default)]
    pub catalog_md: Option<String>,
}

/// Global crawl defaults; every field can be overridden per site
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Pause between consecutive fetches against one site
    #[serde(rename = "delay-seconds", default = "default_delay_seconds")]
    pub delay_seconds: f64,

    /// Include keywords; empty disables keyword filtering
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(rename = "file-exts", default = "default_file_exts")]
    pub file_exts: Vec<String>,

    #[serde(rename = "exclude-keywords", default)]
    pub exclude_keywords: Vec<String>,

    #[serde(rename = "exclude-prefixes", default)]
    pub exclude_prefixes: Vec<String>,

    #[serde(rename = "use-sitemap", default = "default_true")]
    pub use_sitemap: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_pages: DEFAULT_MAX_PAGES,
            max_depth: DEFAULT_MAX_DEPTH,
            delay_seconds: DEFAULT_DELAY_SECONDS,
            keywords: Vec::new(),
            file_exts: default_file_exts(),
            exclude_keywords: Vec::new(),
            exclude_prefixes: Vec::new(),
            use_sitemap: true,
        }
    }
}

/// One configured site; unset fields fall back to `[defaults]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteEntry {
    pub name: String,
    pub url: String,

    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<usize>,

    #[serde(rename = "max-depth", default)]
    pub max_depth: Option<u32>,

    #[serde(rename = "delay-seconds", default)]
    pub delay_seconds: Option<f64>,

    #[serde(default)]
    pub keywords: Option<Vec<String>>,

    #[serde(rename = "file-exts", default)]
    pub file_exts: Option<Vec<String>>,

    /// Merged with the default exclusions, never replacing them
    #[serde(rename = "exclude-keywords", default)]
    pub exclude_keywords: Vec<String>,

    #[serde(rename = "exclude-prefixes", default)]
    pub exclude_prefixes: Vec<String>,

    #[serde(rename = "use-sitemap", default)]
    pub use_sitemap: Option<bool>,
}

/// Catalog processor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_version")]
    pub version: String,

    /// Size of the extraction worker pool
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Rows claimed per batch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Extracted text is truncated to this many characters
    #[serde(rename = "max-chars", default = "default_max_chars")]
    pub max_chars: usize,

    /// Topic keywords deciding relevance; empty treats everything as relevant
    #[serde(rename = "topic-keywords", default)]
    pub topic_keywords: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            version: default_catalog_version(),
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_chars: DEFAULT_MAX_CHARS,
            topic_keywords: Vec::new(),
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_delay_seconds() -> f64 {
    DEFAULT_DELAY_SECONDS
}

fn default_file_exts() -> Vec<String> {
    DEFAULT_FILE_EXTS.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_catalog_version() -> String {
    DEFAULT_CATALOG_VERSION.to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}
