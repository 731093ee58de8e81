//! End-to-end crawl pipeline: fetch → normalize → categorize → publish.
//!
//! One run is a single logical operation. The fetch stage fans out over the
//! network under a wall-clock budget; normalize and categorize run
//! sequentially (cheap, CPU-bound); publishing is the final, atomic step, so
//! a cancelled or failed run never leaves a partial snapshot visible.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use ohpmatlas_catalog::CatalogStore;
use ohpmatlas_categorizer::{Categorizer, RuleSet};
use ohpmatlas_registry::{RegistryClient, normalize_all};
use ohpmatlas_shared::{
    AtlasError, CURRENT_SCHEMA_VERSION, Catalog, FetchConfig, Package, Result, RunId,
};

/// Categorization-rate target reported against after every run.
const COVERAGE_TARGET: f64 = 0.9;

// ---------------------------------------------------------------------------
// Run config & summary
// ---------------------------------------------------------------------------

/// Configuration for one crawl run — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlRunConfig {
    /// Registry fetch settings (concurrency, rate limit, paging, retries).
    pub fetch: FetchConfig,
    /// Minimum normalized score for a category assignment.
    pub confidence_threshold: f64,
    /// Optional TOML rule-set file; the built-in set is used when absent.
    pub rules_file: Option<PathBuf>,
    /// Where the snapshot is published.
    pub snapshot_path: PathBuf,
    /// Package-count floor below which the catalog is considered incomplete.
    pub min_packages: usize,
    /// Treat an incomplete catalog as fatal instead of a warning.
    pub strict_floor: bool,
    /// Fatal ceiling on normalizer rejections (rejected ÷ fetched).
    pub max_rejection_rate: f64,
    /// Wall-clock budget for the fetch stage in seconds; 0 disables it.
    pub run_timeout_secs: u64,
}

/// Result of a completed crawl run.
#[derive(Debug, Clone)]
pub struct CrawlRunSummary {
    /// Identifier of this run.
    pub run_id: RunId,
    /// Path of the published snapshot.
    pub snapshot_path: PathBuf,
    /// Packages in the published snapshot.
    pub total_packages: usize,
    /// Raw entries rejected by the normalizer.
    pub rejected_entries: usize,
    /// Raw entries dropped as duplicate names.
    pub duplicates: usize,
    /// Packages with ≥1 real category ÷ total.
    pub categorization_rate: f64,
    /// Pages fetched from the registry.
    pub pages_fetched: usize,
    /// True when the max-pages cap cut the fetch short.
    pub truncated: bool,
    /// True when the package count fell below the floor (non-strict mode).
    pub incomplete: bool,
    /// Total elapsed time.
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, summary: &CrawlRunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _summary: &CrawlRunSummary) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the full crawl + categorize pipeline and publish the snapshot.
///
/// Only one run may execute at a time; the atomic publish at the end is the
/// sole write to shared state.
#[instrument(skip_all, fields(snapshot = %config.snapshot_path.display()))]
pub async fn run_crawl(
    config: &CrawlRunConfig,
    progress: &dyn ProgressReporter,
) -> Result<CrawlRunSummary> {
    let start = Instant::now();
    let run_id = RunId::new();

    info!(%run_id, "starting crawl run");

    // Load rules before any network work so a bad rules file fails fast.
    let rules = match &config.rules_file {
        Some(path) => RuleSet::load(path)?,
        None => RuleSet::builtin(),
    };

    // --- Phase 1: Fetch ---
    progress.phase("Fetching registry catalog");
    let client = RegistryClient::new(config.fetch.clone())?;
    let fetch = async { client.fetch_all().await };
    let outcome = if config.run_timeout_secs == 0 {
        fetch.await?
    } else {
        tokio::time::timeout(Duration::from_secs(config.run_timeout_secs), fetch)
            .await
            .map_err(|_| {
                AtlasError::Network(format!(
                    "crawl run exceeded its {}s budget",
                    config.run_timeout_secs
                ))
            })??
    };

    // --- Phase 2: Normalize ---
    progress.phase("Normalizing entries");
    let fetched = outcome.entries.len();
    let normalized = normalize_all(&outcome.entries);

    if fetched > 0 {
        let rejection_rate = normalized.rejected as f64 / fetched as f64;
        if rejection_rate > config.max_rejection_rate {
            return Err(AtlasError::malformed(format!(
                "{} of {fetched} entries rejected ({:.1}%, ceiling {:.1}%) — upstream schema drift?",
                normalized.rejected,
                rejection_rate * 100.0,
                config.max_rejection_rate * 100.0
            )));
        }
    }

    // --- Phase 3: Categorize ---
    progress.phase("Categorizing packages");
    let categorizer = Categorizer::new(rules, config.confidence_threshold);
    let categorized = categorizer.categorize_all(&normalized.packages);

    if !normalized.packages.is_empty() && categorized.categorization_rate < COVERAGE_TARGET {
        warn!(
            rate = categorized.categorization_rate,
            target = COVERAGE_TARGET,
            "categorization rate below target"
        );
    }

    // --- Phase 4: Sanity floor ---
    let mut incomplete = false;
    if normalized.packages.len() < config.min_packages {
        if config.strict_floor {
            return Err(AtlasError::IncompleteCatalog {
                got: normalized.packages.len(),
                floor: config.min_packages,
            });
        }
        warn!(
            got = normalized.packages.len(),
            floor = config.min_packages,
            "catalog smaller than the sanity floor, publishing anyway"
        );
        incomplete = true;
    }

    // --- Phase 5: Publish ---
    progress.phase("Publishing snapshot");
    let mut packages = normalized.packages;
    packages.sort_by(|a, b| a.name.cmp(&b.name));

    let catalog = Catalog {
        schema_version: CURRENT_SCHEMA_VERSION,
        run_id: run_id.clone(),
        crawled_at: Utc::now(),
        total_packages: packages.len(),
        rejected_entries: normalized.rejected,
        categorization_rate: categorized.categorization_rate,
        content_hash: content_hash(&packages)?,
        packages,
        assignments: categorized.assignments,
    };

    let store = CatalogStore::new(&config.snapshot_path);
    store.write(&catalog)?;

    let summary = CrawlRunSummary {
        run_id,
        snapshot_path: config.snapshot_path.clone(),
        total_packages: catalog.total_packages,
        rejected_entries: catalog.rejected_entries,
        duplicates: normalized.duplicates,
        categorization_rate: catalog.categorization_rate,
        pages_fetched: outcome.pages_fetched,
        truncated: outcome.truncated,
        incomplete,
        elapsed: start.elapsed(),
    };

    progress.done(&summary);

    info!(
        run_id = %summary.run_id,
        packages = summary.total_packages,
        rejected = summary.rejected_entries,
        rate = summary.categorization_rate,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "crawl run complete"
    );

    Ok(summary)
}

/// SHA-256 of the serialized package array — the snapshot's diff anchor.
fn content_hash(packages: &[Package]) -> Result<String> {
    let json = serde_json::to_string(packages)
        .map_err(|e| AtlasError::validation(format!("package serialization failed: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
