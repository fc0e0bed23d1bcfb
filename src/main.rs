//! litharvest - keyword-driven literature harvester
//!
//! Reads search terms from a markdown file, queries Crossref and PubMed,
//! appends the results to `urls.txt`, `metadata.csv` and `summary.csv`, and
//! downloads open-access PDFs into `References/`.
//!
//! ## Usage
//!
//! ```bash
//! litharvest harvest --section English --language en --max 200
//! litharvest cookies import exported_cookies.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use litharvest::{
    config::{parse_sources, HarvestConfig},
    cookies::CookieManager,
    keywords,
    pipeline::Pipeline,
};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Keyword-driven literature harvester
#[derive(Parser)]
#[command(name = "litharvest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query sources for the keywords and update the output files
    Harvest(HarvestArgs),

    /// Manage cookies for an institutional proxy
    Cookies {
        /// Cookie file (default: ~/.litharvest_cookies.json)
        #[arg(long, global = true)]
        file: Option<PathBuf>,

        #[command(subcommand)]
        action: CookieAction,
    },
}

#[derive(clap::Args)]
struct HarvestArgs {
    /// Base directory for keywords file and outputs
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Keywords markdown file (default: <dir>/keywords.md)
    #[arg(short, long)]
    keywords: Option<PathBuf>,

    /// Keyword section heading, e.g. "English" (default: whole file)
    #[arg(short, long)]
    section: Option<String>,

    /// Language tag written to the metadata table
    #[arg(long, default_value = "")]
    language: String,

    /// Maximum number of records to fetch per source and process
    #[arg(long = "max", default_value = "200")]
    max_results: usize,

    /// Number of keywords joined into the query
    #[arg(long, default_value = "12")]
    max_keywords: usize,

    /// Comma-separated sources, queried in order
    #[arg(long, default_value = "crossref,pubmed")]
    sources: String,

    /// Page size for paginated sources
    #[arg(long, default_value = "50")]
    rows: usize,

    /// Maximum pages per paginated source
    #[arg(long, default_value = "10")]
    max_pages: usize,

    /// Delay between result pages (milliseconds)
    #[arg(long, default_value = "1000")]
    page_delay_ms: u64,

    /// Delay between processed records (milliseconds)
    #[arg(long, default_value = "800")]
    record_delay_ms: u64,

    /// Contact email for API polite pools; enables Unpaywall lookups
    #[arg(long, env = "LITHARVEST_MAILTO")]
    mailto: Option<String>,

    /// Look for citation_pdf_url on landing pages when no PDF link is known
    #[arg(long)]
    resolve_landing: bool,

    /// Only write metadata, do not download PDFs
    #[arg(long)]
    no_download: bool,

    /// Skip records whose file name is already in metadata.csv
    #[arg(long)]
    skip_existing: bool,

    /// Proxy cookie file (JSON export) attached to downloads
    #[arg(long, conflicts_with = "use_cookies")]
    cookie_file: Option<PathBuf>,

    /// Use the default cookie file (~/.litharvest_cookies.json)
    #[arg(long)]
    use_cookies: bool,
}

#[derive(Subcommand)]
enum CookieAction {
    /// Show cookie file path
    Path,
    /// Clear stored cookies
    Clear,
    /// Import exported cookies (JSON array) from a file, or stdin if omitted
    Import {
        /// JSON file to import
        input: Option<PathBuf>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Harvest(args) => run_harvest(args).await,
        Commands::Cookies { file, action } => handle_cookies(file, action),
    }
}

// ============================================================================
// Harvest
// ============================================================================

fn build_config(args: HarvestArgs) -> Result<HarvestConfig> {
    let mut config = HarvestConfig::in_dir(&args.dir);

    if let Some(path) = args.keywords {
        config.keywords_file = path;
    }
    config.section = args.section;
    config.language = args.language;
    config.max_results = args.max_results;
    config.max_keywords = args.max_keywords;
    config.sources = parse_sources(&args.sources)?;
    config.rows_per_page = args.rows;
    config.max_pages = args.max_pages;
    config.page_delay = Duration::from_millis(args.page_delay_ms);
    config.record_delay = Duration::from_millis(args.record_delay_ms);
    config.mailto = args.mailto.filter(|m| !m.trim().is_empty());
    config.resolve_landing = args.resolve_landing;
    config.download = !args.no_download;
    config.skip_existing = args.skip_existing;
    config.cookie_file = match (args.cookie_file, args.use_cookies) {
        (Some(path), _) => Some(path),
        (None, true) => Some(CookieManager::new()?.path().clone()),
        (None, false) => None,
    };

    config.validate()?;
    Ok(config)
}

async fn run_harvest(args: HarvestArgs) -> Result<()> {
    let config = build_config(args).context("Invalid harvest options")?;

    let kws = keywords::load_keywords(&config.keywords_file, config.section.as_deref())
        .with_context(|| format!("Failed to read {}", config.keywords_file.display()))?;

    if kws.is_empty() {
        match &config.section {
            Some(section) => anyhow::bail!(
                "No keywords found in section '{}' of {}",
                section,
                config.keywords_file.display()
            ),
            None => anyhow::bail!("No keywords found in {}", config.keywords_file.display()),
        }
    }

    println!("Keywords ({}): {}", kws.len(), kws.join(", "));
    info!(
        sources = ?config.sources,
        max = config.max_results,
        download = config.download,
        "Harvest configured"
    );

    let metadata_file = config.metadata_file.clone();
    let urls_file = config.urls_file.clone();

    let pipeline = Pipeline::from_config(config).context("Failed to set up harvest")?;
    let summary = pipeline.run(&kws).await;

    println!("\n{}", summary);
    println!(
        "\n✓ Done. Check {} and {}",
        urls_file.display(),
        metadata_file.display()
    );
    Ok(())
}

// ============================================================================
// Cookie Management
// ============================================================================

fn handle_cookies(file: Option<PathBuf>, action: CookieAction) -> Result<()> {
    let manager = match file {
        Some(path) => CookieManager::with_path(path),
        None => CookieManager::new()?,
    };

    match action {
        CookieAction::Path => {
            println!("Cookie file: {:?}", manager.path());
        }
        CookieAction::Clear => {
            manager.clear()?;
            println!("Cookies cleared.");
        }
        CookieAction::Import { input } => {
            let json = match input {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    println!("Paste cookies as JSON, then press Ctrl-D:");
                    println!("Format: [{{\"name\":\"ezproxy\",\"value\":\"xxx\",\"domain\":\".library.example.edu\"}},...]");
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };

            let count = manager.import(&json).context("Invalid cookie JSON")?;
            println!("Saved {} cookies to {:?}", count, manager.path());
        }
    }

    Ok(())
}
