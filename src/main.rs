//! Product Scout main entry point
//!
//! This is the command-line interface for the Product Scout crawler.

use anyhow::Context;
use clap::Parser;
use product_scout::config::{load_config_with_hash, Config};
use product_scout::crawler::CrawlController;
use product_scout::output::{
    export_from_storage, generate_markdown_summary, load_statistics, print_statistics,
    summary_from_storage, CrawlSummary,
};
use product_scout::storage::{open_storage, Storage};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Grace period given to in-flight fetches after Ctrl-C
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Product Scout: a polite e-commerce product URL crawler
///
/// Product Scout crawls shop domains while respecting robots.txt, crawl
/// delays and per-domain concurrency limits, and records every URL that
/// looks like a product page.
#[derive(Parser, Debug)]
#[command(name = "product-scout")]
#[command(version)]
#[command(about = "A polite e-commerce product URL crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding saved frontier and dedup state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export", "export_summary"])]
    stats: bool,

    /// Export logged products as per-domain JSON files and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_summary"])]
    export: bool,

    /// Generate markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export"])]
    export_summary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("product_scout=info,warn"),
            1 => EnvFilter::new("product_scout=debug,info"),
            2 => EnvFilter::new("product_scout=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration and seeds
fn handle_dry_run(config: &Config) {
    println!("=== Product Scout Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Global worker budget: {}", config.crawler.global_worker_budget);
    println!("  Max concurrent per domain: {}", config.crawler.max_concurrent_per_domain);
    println!("  Crawl delay: {}ms", config.crawler.crawl_delay_ms);
    println!("  Request timeout: {}ms", config.crawler.request_timeout_ms);
    println!(
        "  Retries: {} (backoff {}ms..{}ms)",
        config.crawler.max_retries, config.crawler.backoff_base_ms, config.crawler.backoff_cap_ms
    );
    println!("  Max depth: {}", config.crawler.max_depth);
    match config.crawler.max_products_per_domain {
        Some(limit) => println!("  Max products per domain: {}", limit),
        None => println!("  Max products per domain: unlimited"),
    }
    println!("  Obey robots.txt: {}", config.crawler.obey_robots);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Products: {}", config.output.products_path);
    println!("  Summary: {}", config.output.summary_path);
    if let Some(dir) = &config.output.export_dir {
        println!("  Export directory: {}", dir);
    }

    println!("\nDomains ({}):", config.domains.len());
    for entry in &config.domains {
        print!("  - {}", entry.domain);
        if let Some(delay) = entry.crawl_delay_ms {
            print!(" (crawl delay {}ms)", delay);
        }
        println!();
        for seed in &entry.seeds {
            println!("    * {}", seed);
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", config.seed_urls().len());
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes logged products as JSON files
fn handle_export(config: &Config) -> anyhow::Result<()> {
    let dir = export_dir(config);
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let report = export_from_storage(&storage, &dir)?;

    println!("✓ Exported {} product URLs to {}", report.products, dir.display());
    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Crawl Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    let storage = open_storage(Path::new(&config.output.database_path))?;

    tracing::info!("Loading crawl data from database...");
    let summary = summary_from_storage(&storage)?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))?;

    println!("✓ Summary exported to: {}", config.output.summary_path);
    Ok(())
}

fn export_dir(config: &Config) -> PathBuf {
    PathBuf::from(config.output.export_dir.as_deref().unwrap_or("output"))
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    let database_path = PathBuf::from(&config.output.database_path);
    let summary_path = PathBuf::from(&config.output.summary_path);
    let export_to = config.output.export_dir.as_ref().map(|_| export_dir(&config));
    let seeds = config.seed_urls();

    if fresh {
        tracing::info!("Starting fresh crawl (discarding saved crawl state)");
        open_storage(&database_path)?
            .reset_crawl_state()
            .context("failed to reset crawl state")?;
    } else {
        tracing::info!("Starting crawl (will resume if saved state exists)");
    }

    tracing::info!("Domains: {}, seed URLs: {}", config.domains.len(), seeds.len());

    let mut controller = CrawlController::from_config(config, config_hash)?;
    if !fresh {
        controller.resume().context("failed to restore crawl state")?;
    }
    controller.start(seeds)?;

    let summary = tokio::select! {
        summary = controller.drain() => summary?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupt received; stopping (grace period {:?})", SHUTDOWN_GRACE);
            controller.shutdown(SHUTDOWN_GRACE).await?
        }
    };

    report(&summary);

    generate_markdown_summary(&summary, &summary_path)?;
    tracing::info!("Summary written to {}", summary_path.display());

    if let Some(dir) = export_to {
        let storage = open_storage(&database_path)?;
        export_from_storage(&storage, &dir)?;
    }

    Ok(())
}

fn report(summary: &CrawlSummary) {
    tracing::info!(
        "Crawl {} in {}s: {} URLs seen, {} products, {:.1}% success, {} still queued",
        summary.status,
        summary.duration_seconds().unwrap_or(0),
        summary.urls_seen(),
        summary.products_emitted,
        summary.success_rate(),
        summary.frontier_remaining
    );
    for domain in &summary.domains {
        tracing::info!(
            "  - {}: {} products, {} URLs ok / {} failed / {} blocked, {} pending, {} requests",
            domain.domain,
            domain.products,
            domain.succeeded,
            domain.failed,
            domain.blocked,
            domain.pending,
            domain.dispatched
        );
    }
}
