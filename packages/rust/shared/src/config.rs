//! Application configuration for ohpm-atlas.
//!
//! User config lives at `~/.ohpm-atlas/ohpm-atlas.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ohpm-atlas.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ohpm-atlas";

// ---------------------------------------------------------------------------
// Config structs (matching ohpm-atlas.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Crawl/categorize defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Upstream registry endpoint settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Sanity limits for a run.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the published catalog snapshot.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Maximum concurrent page fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Requests-per-second ceiling for the registry.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Safety cap on pages fetched in one run.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Minimum normalized score for a category assignment.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Wall-clock budget for a whole crawl run, in seconds.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Optional TOML file overriding the built-in category rule set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            concurrency: default_concurrency(),
            rate_limit: default_rate_limit(),
            max_pages: default_max_pages(),
            confidence_threshold: default_confidence_threshold(),
            run_timeout_secs: default_run_timeout_secs(),
            rules_file: None,
        }
    }
}

fn default_snapshot_path() -> String {
    "packages.json".into()
}
fn default_concurrency() -> u32 {
    10
}
fn default_rate_limit() -> u32 {
    8
}
fn default_max_pages() -> u32 {
    200
}
fn default_confidence_threshold() -> f64 {
    0.15
}
fn default_run_timeout_secs() -> u64 {
    300
}

/// `[registry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Search endpoint of the OHPM registry read API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Page size requested per fetch.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry attempts for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds (doubled per attempt).
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

fn default_base_url() -> String {
    "https://ohpm.openharmony.cn/ohpmweb/registry/oh-package/openapi/v1/search".into()
}
fn default_page_size() -> u32 {
    50
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    500
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Package-count floor below which the catalog is considered incomplete.
    #[serde(default = "default_min_packages")]
    pub min_packages: usize,

    /// Treat an incomplete catalog as fatal instead of a warning.
    #[serde(default)]
    pub strict_floor: bool,

    /// Fatal ceiling on normalizer rejections (rejected ÷ fetched).
    #[serde(default = "default_max_rejection_rate")]
    pub max_rejection_rate: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_packages: default_min_packages(),
            strict_floor: false,
            max_rejection_rate: default_max_rejection_rate(),
        }
    }
}

fn default_min_packages() -> usize {
    100
}
fn default_max_rejection_rate() -> f64 {
    0.2
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime registry-fetch configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Search endpoint of the registry read API.
    pub base_url: String,
    /// Page size requested per fetch.
    pub page_size: u32,
    /// Maximum concurrent page fetches.
    pub concurrency: u32,
    /// Requests-per-second ceiling (0 disables the limiter).
    pub rate_limit: u32,
    /// Safety cap on pages fetched in one run.
    pub max_pages: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry attempts for transient failures.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub retry_base_ms: u64,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.registry.base_url.clone(),
            page_size: config.registry.page_size,
            concurrency: config.defaults.concurrency,
            rate_limit: config.defaults.rate_limit,
            max_pages: config.defaults.max_pages,
            timeout_secs: config.registry.timeout_secs,
            max_retries: config.registry.max_retries,
            retry_base_ms: config.registry.retry_base_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ohpm-atlas/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AtlasError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ohpm-atlas/ohpm-atlas.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AtlasError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AtlasError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AtlasError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AtlasError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AtlasError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("snapshot_path"));
        assert!(toml_str.contains("ohpm.openharmony.cn"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.concurrency, 10);
        assert_eq!(parsed.registry.page_size, 50);
        assert_eq!(parsed.limits.min_packages, 100);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
concurrency = 4
rate_limit = 2

[limits]
strict_floor = true
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.concurrency, 4);
        assert_eq!(config.defaults.rate_limit, 2);
        assert_eq!(config.defaults.max_pages, 200);
        assert!(config.limits.strict_floor);
        assert_eq!(config.limits.min_packages, 100);
    }

    #[test]
    fn fetch_config_from_app_config() {
        let app = AppConfig::default();
        let fetch = FetchConfig::from(&app);
        assert_eq!(fetch.concurrency, 10);
        assert_eq!(fetch.rate_limit, 8);
        assert_eq!(fetch.page_size, 50);
        assert_eq!(fetch.max_retries, 3);
    }
}
