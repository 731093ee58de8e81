//! Core domain types for the ohpm-atlas catalog.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the catalog snapshot format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Reserved category id for packages that clear no real category.
pub const FALLBACK_CATEGORY_ID: &str = "uncategorized";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for crawl-run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Package
// ---------------------------------------------------------------------------

/// One registry package in canonical form, as produced by the normalizer.
///
/// Every field degrades to an explicit "unknown" sentinel (empty string or
/// zero) rather than failing; `name` is the only required identity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Package name, unique within one snapshot. Never empty.
    pub name: String,
    /// Owning organization/namespace (e.g. `ohos`). May be empty.
    #[serde(default)]
    pub org: String,
    /// Registry package type. May be empty.
    #[serde(default)]
    pub package_type: String,
    /// Free-text description. May be empty.
    #[serde(default)]
    pub description: String,
    /// Lower-cased, deduplicated, sorted keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Latest published version string.
    #[serde(default)]
    pub latest_version: String,
    /// Latest publish time as epoch milliseconds; 0 means unknown.
    #[serde(default)]
    pub latest_publish_time: i64,
    /// License identifier. Empty means unknown.
    #[serde(default)]
    pub license: String,
    /// Author display name.
    #[serde(default)]
    pub author_name: String,
    /// Publisher account id.
    #[serde(default)]
    pub publisher_id: String,
    /// Publisher display name.
    #[serde(default)]
    pub publisher_name: String,
    /// Like count.
    #[serde(default)]
    pub likes: u64,
    /// Registry points score.
    #[serde(default)]
    pub points: u64,
    /// Registry popularity score.
    #[serde(default)]
    pub popularity: u64,
}

// ---------------------------------------------------------------------------
// CategoryAssignment
// ---------------------------------------------------------------------------

/// One scored category membership for a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    /// Category id (stable, kebab-case).
    pub category_id: String,
    /// Normalized confidence in (0, 1].
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The write-once snapshot produced by one crawl run.
///
/// Packages are sorted by name and assignments live in a `BTreeMap`, so two
/// runs over unchanged upstream data serialize identically apart from
/// `run_id` and `crawled_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Identifier of the crawl run that produced this snapshot.
    pub run_id: RunId,
    /// When the crawl run completed.
    pub crawled_at: DateTime<Utc>,
    /// Number of packages in this snapshot.
    pub total_packages: usize,
    /// Raw entries rejected by the normalizer during this run.
    pub rejected_entries: usize,
    /// Packages with at least one non-fallback assignment ÷ total.
    pub categorization_rate: f64,
    /// SHA-256 of the serialized `packages` array.
    pub content_hash: String,
    /// Packages, sorted by name.
    pub packages: Vec<Package>,
    /// Category assignments keyed by package name, each vector in
    /// category-evaluation order.
    pub assignments: BTreeMap<String, Vec<CategoryAssignment>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_package(name: &str) -> Package {
        Package {
            name: name.into(),
            org: "ohos".into(),
            package_type: "HAR".into(),
            description: "a sample package".into(),
            keywords: vec!["http".into(), "network".into()],
            latest_version: "1.2.3".into(),
            latest_publish_time: 1_700_000_000_000,
            license: "Apache-2.0".into(),
            author_name: "someone".into(),
            publisher_id: "pub-1".into(),
            publisher_name: "Someone".into(),
            likes: 4,
            points: 80,
            popularity: 12_345,
        }
    }

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn package_defaults_degrade_to_unknown() {
        let json = r#"{"name": "minimal"}"#;
        let pkg: Package = serde_json::from_str(json).expect("deserialize");
        assert_eq!(pkg.name, "minimal");
        assert_eq!(pkg.org, "");
        assert_eq!(pkg.likes, 0);
        assert_eq!(pkg.latest_publish_time, 0);
        assert!(pkg.keywords.is_empty());
    }

    #[test]
    fn package_missing_name_fails() {
        let json = r#"{"org": "ohos"}"#;
        assert!(serde_json::from_str::<Package>(json).is_err());
    }

    #[test]
    fn catalog_serialization_roundtrip() {
        let mut assignments = BTreeMap::new();
        assignments.insert(
            "pkg-a".to_string(),
            vec![CategoryAssignment {
                category_id: "networking".into(),
                score: 0.42,
            }],
        );

        let catalog = Catalog {
            schema_version: CURRENT_SCHEMA_VERSION,
            run_id: RunId::new(),
            crawled_at: Utc::now(),
            total_packages: 1,
            rejected_entries: 0,
            categorization_rate: 1.0,
            content_hash: "0".repeat(64),
            packages: vec![sample_package("pkg-a")],
            assignments,
        };

        let json = serde_json::to_string_pretty(&catalog).expect("serialize");
        let parsed: Catalog = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(parsed.total_packages, 1);
        assert_eq!(parsed.packages[0].name, "pkg-a");
        assert_eq!(parsed.assignments["pkg-a"][0].category_id, "networking");
    }

    #[test]
    fn catalog_missing_required_keys_fails() {
        // No `packages` array: a consumer must get a clear error, not defaults.
        let json = r#"{"schema_version": 1}"#;
        assert!(serde_json::from_str::<Catalog>(json).is_err());
    }
}
