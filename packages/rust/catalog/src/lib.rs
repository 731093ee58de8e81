//! Catalog snapshot store and read-only projections.
//!
//! This crate provides:
//! - [`store`] — Atomic write/read of the catalog snapshot file
//! - [`search`] — Query, filter, and aggregation projections for consumers

pub mod search;
pub mod store;

pub use search::{
    CatalogStats, SearchQuery, assignments_by_score, category_counts, license_counts,
    org_counts, search, stats,
};
pub use store::CatalogStore;
