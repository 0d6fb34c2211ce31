//! Doc-Harvester main entry point
//!
//! This is the command-line interface for crawling configured sites and
//! cataloging the documents they publish.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use doc_harvester::catalog::{run_catalog, CatalogOptions};
use doc_harvester::config::{
    load_config, load_config_with_hash, resolve_site_rules, split_filter, Config, SiteOverrides,
};
use doc_harvester::crawler::{build_http_client, run_update, Crawler};
use doc_harvester::output::{export_to_path, load_statistics, print_statistics, ExportFormat};
use doc_harvester::progress::RunContext;
use doc_harvester::storage::{open_storage, ContentStore};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Doc-Harvester: discover, download and catalog documents
///
/// Crawls each configured site breadth-first, stores every distinct document
/// once, and builds a keyword catalog of the stored documents.
#[derive(Parser, Debug)]
#[command(name = "doc-harvester")]
#[command(version = "1.0.0")]
#[command(about = "Discover, download and catalog documents from configured sites", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl configured sites and download new documents
    Update {
        /// Only sites whose name or URL contains one of these comma-separated tokens
        #[arg(long)]
        site: Option<String>,

        /// Override the page budget of every site
        #[arg(long)]
        max_pages: Option<usize>,

        /// Override the depth budget of every site
        #[arg(long)]
        max_depth: Option<u32>,

        /// Collect file links from this one page instead of crawling
        #[arg(long, value_name = "URL")]
        scan: Option<String>,
    },

    /// Extract, classify and record pending documents
    Catalog {
        /// Only sites whose name contains one of these comma-separated tokens
        #[arg(long)]
        site: Option<String>,

        /// Claim at most this many items
        #[arg(long)]
        limit: Option<usize>,

        /// Move error items back to pending before claiming
        #[arg(long)]
        retry_errors: bool,

        /// Catalog version tag (defaults to [catalog] version)
        #[arg(long = "catalog-version")]
        catalog_version: Option<String>,

        /// Worker pool size (defaults to [catalog] workers)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Move every error item of a catalog version back to pending
    RetryErrors {
        #[arg(long = "catalog-version")]
        catalog_version: Option<String>,
    },

    /// Show statistics from the database
    Stats {
        #[arg(long = "catalog-version")]
        catalog_version: Option<String>,
    },

    /// Export the file index
    Export {
        /// jsonl or md
        #[arg(long, default_value = "jsonl")]
        format: ExportFormat,

        #[arg(short, long)]
        output: PathBuf,

        /// Only files of this site
        #[arg(long)]
        site: Option<String>,

        #[arg(long = "catalog-version")]
        catalog_version: Option<String>,
    },

    /// Validate the configuration and show the resolved sites
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Update {
            site,
            max_pages,
            max_depth,
            scan,
        } => {
            let overrides = SiteOverrides {
                site_filter: site,
                max_pages,
                max_depth,
            };
            handle_update(&cli.config, &overrides, scan).await
        }
        Command::Catalog {
            site,
            limit,
            retry_errors,
            catalog_version,
            workers,
        } => {
            let config = load(&cli.config)?;
            let mut options = CatalogOptions::from_config(&config.catalog);
            options.site_filter = split_filter(site.as_deref());
            options.limit = limit;
            options.retry_errors = retry_errors;
            if let Some(version) = catalog_version {
                options.version = version;
            }
            if let Some(workers) = workers {
                options.workers = workers.clamp(1, 64);
            }
            handle_catalog(&config, options).await
        }
        Command::RetryErrors { catalog_version } => {
            let config = load(&cli.config)?;
            let version = catalog_version.unwrap_or_else(|| config.catalog.version.clone());
            let mut storage = open_db(&config)?;
            let reset = storage.reset_errors(&version)?;
            println!("Moved {} error item(s) of {} back to pending", reset, version);
            Ok(())
        }
        Command::Stats { catalog_version } => {
            let config = load(&cli.config)?;
            let version = catalog_version.unwrap_or_else(|| config.catalog.version.clone());
            println!("Database: {}\n", config.paths.database);
            let storage = open_db(&config)?;
            print_statistics(&load_statistics(&storage, &version)?);
            Ok(())
        }
        Command::Export {
            format,
            output,
            site,
            catalog_version,
        } => {
            let config = load(&cli.config)?;
            let version = catalog_version.unwrap_or_else(|| config.catalog.version.clone());
            let storage = open_db(&config)?;
            let written = export_to_path(&storage, &version, site.as_deref(), format, &output)
                .with_context(|| format!("failed to export to {}", output.display()))?;
            println!("✓ Exported {} file(s) to {}", written, output.display());
            Ok(())
        }
        Command::CheckConfig => handle_check_config(&cli.config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("doc_harvester=info,warn"),
            1 => EnvFilter::new("doc_harvester=debug,info"),
            2 => EnvFilter::new("doc_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load(path: &Path) -> anyhow::Result<Config> {
    load_config(path).with_context(|| format!("failed to load {}", path.display()))
}

fn open_db(config: &Config) -> anyhow::Result<doc_harvester::storage::SqliteStorage> {
    open_storage(Path::new(&config.paths.database))
        .with_context(|| format!("failed to open database {}", config.paths.database))
}

/// A run context cancelled by Ctrl-C whose progress events are logged
fn interactive_context() -> RunContext {
    let (ctx, mut events) = RunContext::with_events();

    let cancel = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event.total > 0 {
                tracing::info!(
                    "[{}] {}/{} {}",
                    event.phase,
                    event.current,
                    event.total,
                    event.message
                );
            } else {
                tracing::info!("[{}] {} {}", event.phase, event.current, event.message);
            }
        }
    });

    ctx
}

/// Handles `update`: crawls the selected sites, or scans one page
async fn handle_update(
    config_path: &Path,
    overrides: &SiteOverrides,
    scan: Option<String>,
) -> anyhow::Result<()> {
    tracing::info!("Loading configuration from: {}", config_path.display());
    let (config, config_hash) = load_config_with_hash(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let rules = resolve_site_rules(&config, overrides);
    if rules.is_empty() {
        bail!("no configured site matches the site filter");
    }
    let ctx = interactive_context();

    if let Some(url) = scan {
        let rule = &rules[0];
        let storage = open_db(&config)?;
        let client = build_http_client(&config.defaults.user_agent)?;
        let mut crawler = Crawler::new(storage, client, &config.paths.download_dir, ctx);
        let report = crawler.scan_page(&url, rule).await?;
        println!("{}", report);
        return Ok(());
    }

    let reports = run_update(&config, &config_hash, &rules, &ctx).await?;
    for report in &reports {
        println!("{}", report);
    }
    if ctx.is_cancelled() {
        println!("Update interrupted; rerun to continue");
    }

    Ok(())
}

/// Handles `catalog`: processes pending items for one version
async fn handle_catalog(config: &Config, options: CatalogOptions) -> anyhow::Result<()> {
    tracing::info!(
        "Cataloging version {} with {} worker(s)",
        options.version,
        options.workers
    );
    let ctx = interactive_context();

    let report = run_catalog(config, options, &ctx)
        .await
        .context("catalog run failed")?;
    println!("{}", report);
    if report.cancelled {
        println!("Catalog interrupted; unfinished items are pending again");
    }

    Ok(())
}

/// Handles `check-config`: validates the config and shows what would be crawled
fn handle_check_config(config_path: &Path) -> anyhow::Result<()> {
    let (config, hash) = load_config_with_hash(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    println!("=== Doc-Harvester Configuration ===\n");
    println!("Paths:");
    println!("  Database: {}", config.paths.database);
    println!("  Downloads: {}", config.paths.download_dir);
    if let Some(jsonl) = &config.paths.catalog_jsonl {
        println!("  Catalog JSONL: {}", jsonl);
    }
    if let Some(md) = &config.paths.catalog_md {
        println!("  Catalog Markdown: {}", md);
    }

    println!("\nCatalog:");
    println!("  Version: {}", config.catalog.version);
    println!("  Workers: {}", config.catalog.workers);
    println!("  Batch size: {}", config.catalog.batch_size);
    println!("  Topic keywords: {}", config.catalog.topic_keywords.len());

    let rules = resolve_site_rules(&config, &SiteOverrides::default());
    println!("\nSites ({}):", rules.len());
    for rule in &rules {
        println!(
            "  - {} {} (pages {}, depth {}, delay {:.1}s, sitemap {})",
            rule.name,
            rule.url,
            rule.max_pages,
            rule.max_depth,
            rule.delay.as_secs_f64(),
            if rule.use_sitemap { "on" } else { "off" }
        );
        if !rule.exclude_keywords.is_empty() {
            println!("    exclude: {}", rule.exclude_keywords.join(", "));
        }
    }

    println!("\n✓ Configuration is valid (hash: {})", hash);
    Ok(())
}
