//! Shared types, error model, and configuration for ohpm-atlas.
//!
//! This crate is the foundation depended on by all other ohpm-atlas crates.
//! It provides:
//! - [`AtlasError`] — the unified error type
//! - Domain types ([`Package`], [`CategoryAssignment`], [`Catalog`], [`RunId`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, FetchConfig, LimitsConfig, RegistryConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{AtlasError, Result};
pub use types::{
    CURRENT_SCHEMA_VERSION, Catalog, CategoryAssignment, FALLBACK_CATEGORY_ID, Package, RunId,
};
