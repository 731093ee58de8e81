//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::ProgressBar;
use ohpmatlas_catalog::{CatalogStore, SearchQuery};
use ohpmatlas_core::{
    CrawlRunConfig, CrawlRunSummary, ProgressReporter, run_crawl,
};
use ohpmatlas_shared::{AppConfig, Catalog, FetchConfig, init_config, load_config};

/// Registry web UI base for package detail links.
const DETAIL_URL_BASE: &str = "https://ohpm.openharmony.cn/#/cn/detail/";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ohpm-atlas — crawl the OHPM registry and categorize every package.
#[derive(Parser)]
#[command(
    name = "ohpm-atlas",
    version,
    about = "Crawl the OHPM registry, categorize packages, and search the result.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a full crawl + categorize and publish the catalog snapshot.
    Crawl {
        /// Snapshot output path (defaults to the configured path).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Maximum concurrent page fetches.
        #[arg(long)]
        concurrency: Option<u32>,

        /// Requests-per-second ceiling.
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Safety cap on pages fetched.
        #[arg(long)]
        max_pages: Option<u32>,

        /// Minimum normalized score for a category assignment.
        #[arg(long)]
        threshold: Option<f64>,

        /// TOML rule-set file overriding the built-in categories.
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Fail instead of warning when the catalog is below the floor.
        #[arg(long)]
        strict_floor: bool,

        /// Wall-clock budget for the run in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Search and filter packages in the published snapshot.
    Search {
        /// Free-text query (matches name, description, and keywords).
        query: Option<String>,

        /// Filter by organization.
        #[arg(long)]
        org: Option<String>,

        /// Filter by license.
        #[arg(long)]
        license: Option<String>,

        /// Filter by assigned category id.
        #[arg(long)]
        category: Option<String>,

        /// Minimum number of likes.
        #[arg(long, default_value_t = 0)]
        min_likes: u64,

        /// Minimum popularity score.
        #[arg(long, default_value_t = 0)]
        min_popularity: u64,

        /// Maximum number of results.
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Show detailed information per package.
        #[arg(long)]
        detailed: bool,

        /// Snapshot path (defaults to the configured path).
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Show summary statistics for the published snapshot.
    Stats {
        /// Snapshot path (defaults to the configured path).
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// List organizations by package count.
    Orgs {
        /// Snapshot path (defaults to the configured path).
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// List licenses by package count.
    Licenses {
        /// Snapshot path (defaults to the configured path).
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Crawl {
            out,
            concurrency,
            rate_limit,
            max_pages,
            threshold,
            rules,
            strict_floor,
            timeout_secs,
        } => {
            cmd_crawl(
                out,
                concurrency,
                rate_limit,
                max_pages,
                threshold,
                rules,
                strict_floor,
                timeout_secs,
            )
            .await
        }
        Command::Search {
            query,
            org,
            license,
            category,
            min_likes,
            min_popularity,
            limit,
            detailed,
            snapshot,
        } => cmd_search(
            SearchQuery {
                query,
                org,
                license,
                category,
                min_likes,
                min_popularity,
                limit,
            },
            detailed,
            snapshot,
        ),
        Command::Stats { snapshot } => cmd_stats(snapshot),
        Command::Orgs { snapshot } => cmd_orgs(snapshot),
        Command::Licenses { snapshot } => cmd_licenses(snapshot),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Crawl
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn cmd_crawl(
    out: Option<PathBuf>,
    concurrency: Option<u32>,
    rate_limit: Option<u32>,
    max_pages: Option<u32>,
    threshold: Option<f64>,
    rules: Option<PathBuf>,
    strict_floor: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let app_config = load_config()?;

    let mut fetch = FetchConfig::from(&app_config);
    if let Some(v) = concurrency {
        fetch.concurrency = v;
    }
    if let Some(v) = rate_limit {
        fetch.rate_limit = v;
    }
    if let Some(v) = max_pages {
        fetch.max_pages = v;
    }

    let run_config = CrawlRunConfig {
        fetch,
        confidence_threshold: threshold
            .unwrap_or(app_config.defaults.confidence_threshold),
        rules_file: rules.or_else(|| {
            app_config.defaults.rules_file.as_ref().map(PathBuf::from)
        }),
        snapshot_path: out
            .unwrap_or_else(|| PathBuf::from(&app_config.defaults.snapshot_path)),
        min_packages: app_config.limits.min_packages,
        strict_floor: strict_floor || app_config.limits.strict_floor,
        max_rejection_rate: app_config.limits.max_rejection_rate,
        run_timeout_secs: timeout_secs.unwrap_or(app_config.defaults.run_timeout_secs),
    };

    let progress = SpinnerProgress::new();
    let summary = run_crawl(&run_config, &progress).await?;

    tracing::info!(
        run_id = %summary.run_id,
        snapshot = %summary.snapshot_path.display(),
        "snapshot published"
    );

    println!("Crawl complete.");
    println!("  Snapshot:       {}", summary.snapshot_path.display());
    println!("  Packages:       {}", summary.total_packages);
    println!("  Rejected:       {}", summary.rejected_entries);
    if summary.duplicates > 0 {
        println!("  Duplicates:     {}", summary.duplicates);
    }
    println!(
        "  Categorized:    {:.1}%",
        summary.categorization_rate * 100.0
    );
    println!("  Pages fetched:  {}", summary.pages_fetched);
    if summary.truncated {
        println!("  Warning: fetch was truncated by the max-pages cap");
    }
    if summary.incomplete {
        println!("  Warning: package count is below the configured floor");
    }
    println!("  Elapsed:        {:.1}s", summary.elapsed.as_secs_f64());

    Ok(())
}

/// Indicatif spinner wired to pipeline phase callbacks.
struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressReporter for SpinnerProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn done(&self, _summary: &CrawlRunSummary) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Search & listings
// ---------------------------------------------------------------------------

fn load_snapshot(snapshot: Option<PathBuf>) -> Result<Catalog> {
    let app_config = load_config()?;
    let path = snapshot
        .unwrap_or_else(|| PathBuf::from(&app_config.defaults.snapshot_path));
    Ok(CatalogStore::new(path).read()?)
}

fn cmd_search(query: SearchQuery, detailed: bool, snapshot: Option<PathBuf>) -> Result<()> {
    let catalog = load_snapshot(snapshot)?;
    let results = ohpmatlas_catalog::search(&catalog, &query);

    if results.is_empty() {
        println!("No packages found matching your criteria.");
        return Ok(());
    }

    println!("Found {} packages:\n", results.len());

    for (i, pkg) in results.iter().enumerate() {
        let description = if !detailed && pkg.description.chars().count() > 80 {
            let truncated: String = pkg.description.chars().take(77).collect();
            format!("{truncated}...")
        } else {
            pkg.description.clone()
        };

        println!("{:2}. {}", i + 1, pkg.name);
        println!("    {}", detail_url(&pkg.name));
        println!(
            "    org: {} | license: {} | v{}",
            or_unknown(&pkg.org),
            or_unknown(&pkg.license),
            or_unknown(&pkg.latest_version)
        );
        println!(
            "    {} likes | {} popularity",
            pkg.likes, pkg.popularity
        );
        if !description.is_empty() {
            println!("    {description}");
        }

        let categories: Vec<String> =
            ohpmatlas_catalog::assignments_by_score(&catalog, &pkg.name)
                .iter()
                .map(|a| format!("{} ({:.2})", a.category_id, a.score))
                .collect();
        if !categories.is_empty() {
            println!("    categories: {}", categories.join(", "));
        }

        if detailed {
            if !pkg.author_name.is_empty() || !pkg.publisher_name.is_empty() {
                println!(
                    "    author: {} | publisher: {}",
                    or_unknown(&pkg.author_name),
                    or_unknown(&pkg.publisher_name)
                );
            }
            if let Some(date) = format_publish_time(pkg.latest_publish_time) {
                println!("    last updated: {date}");
            }
        }

        println!();
    }

    Ok(())
}

fn cmd_stats(snapshot: Option<PathBuf>) -> Result<()> {
    let catalog = load_snapshot(snapshot)?;
    let stats = ohpmatlas_catalog::stats(&catalog);

    println!("Catalog statistics:");
    println!("  Crawled at:           {}", catalog.crawled_at.to_rfc3339());
    println!("  Total packages:       {}", stats.total_packages);
    println!("  Total likes:          {}", stats.total_likes);
    println!("  Average popularity:   {:.1}", stats.avg_popularity);
    println!(
        "  With description:     {} ({:.1}%)",
        stats.with_description,
        percentage(stats.with_description, stats.total_packages)
    );
    println!("  Unique organizations: {}", stats.unique_orgs);
    println!("  Unique licenses:      {}", stats.unique_licenses);
    println!(
        "  Categorization rate:  {:.1}%",
        stats.categorization_rate * 100.0
    );

    if let Some((name, popularity)) = &stats.top_popular {
        println!("  Most popular:         {name} ({popularity})");
    }
    if let Some((name, likes)) = &stats.top_liked {
        println!("  Most liked:           {name} ({likes} likes)");
    }

    let categories = ohpmatlas_catalog::category_counts(&catalog);
    if !categories.is_empty() {
        println!("\nPackages per category:");
        for (id, count) in categories {
            println!("  {id}: {count}");
        }
    }

    Ok(())
}

fn cmd_orgs(snapshot: Option<PathBuf>) -> Result<()> {
    let catalog = load_snapshot(snapshot)?;
    let orgs = ohpmatlas_catalog::org_counts(&catalog);

    println!("Found {} organizations:", orgs.len());
    for (org, count) in orgs {
        println!("  {org} ({count} packages)");
    }
    Ok(())
}

fn cmd_licenses(snapshot: Option<PathBuf>) -> Result<()> {
    let catalog = load_snapshot(snapshot)?;
    let licenses = ohpmatlas_catalog::license_counts(&catalog);

    println!("Found {} license types:", licenses.len());
    for (license, count) in licenses {
        println!("  {license}: {count} packages");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Created default config at {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Registry web UI detail link for a package.
fn detail_url(name: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
    format!("{DETAIL_URL_BASE}{encoded}")
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { "unknown" } else { value }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn format_publish_time(epoch_millis: i64) -> Option<String> {
    if epoch_millis <= 0 {
        return None;
    }
    chrono::DateTime::from_timestamp_millis(epoch_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
}
