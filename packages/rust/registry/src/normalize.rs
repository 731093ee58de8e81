//! Raw-entry normalization.
//!
//! The registry returns loosely-typed rows: numbers arrive as numbers or
//! strings, timestamps as epoch millis or RFC 3339 text, keywords as an
//! array or a comma list. [`normalize`] coerces each row into the canonical
//! [`Package`] record or rejects it with a [`RejectReason`]. Pure and
//! deterministic; rejections never abort a run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use ohpmatlas_shared::Package;

// ---------------------------------------------------------------------------
// RawEntry
// ---------------------------------------------------------------------------

/// One raw registry row as returned by the search API.
///
/// Every field is optional and loosely typed; unknown fields are ignored so
/// upstream schema additions do not break the fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEntry {
    pub name: Option<String>,
    pub description: Option<String>,
    pub org: Option<String>,
    pub package_type: Option<String>,
    pub latest_version: Option<String>,
    pub latest_publish_time: Option<Value>,
    pub license: Option<String>,
    pub keywords: Option<Value>,
    pub author_name: Option<String>,
    pub publisher_id: Option<Value>,
    pub publisher_name: Option<String>,
    pub likes: Option<Value>,
    pub points: Option<Value>,
    pub popularity: Option<Value>,
}

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

/// Why a raw entry was rejected by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The identity field is missing or empty after trimming.
    MissingName,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "missing or empty name"),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize one raw entry into a canonical [`Package`].
///
/// Absent fields degrade to explicit unknown sentinels (empty string, zero)
/// rather than guessed defaults.
pub fn normalize(entry: &RawEntry) -> Result<Package, RejectReason> {
    let name = trimmed(&entry.name);
    if name.is_empty() {
        return Err(RejectReason::MissingName);
    }

    Ok(Package {
        name,
        org: trimmed(&entry.org),
        package_type: trimmed(&entry.package_type),
        description: trimmed(&entry.description),
        keywords: coerce_keywords(entry.keywords.as_ref()),
        latest_version: trimmed(&entry.latest_version),
        latest_publish_time: coerce_epoch_millis(entry.latest_publish_time.as_ref()),
        license: trimmed(&entry.license),
        author_name: trimmed(&entry.author_name),
        publisher_id: stringify(entry.publisher_id.as_ref()),
        publisher_name: trimmed(&entry.publisher_name),
        likes: coerce_count(entry.likes.as_ref()),
        points: coerce_count(entry.points.as_ref()),
        popularity: coerce_count(entry.popularity.as_ref()),
    })
}

/// Outcome of normalizing a full fetch.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    /// Packages in input order, deduplicated by name (first occurrence wins).
    pub packages: Vec<Package>,
    /// Entries rejected for a missing identity field.
    pub rejected: usize,
    /// Entries dropped because an earlier entry claimed the same name.
    pub duplicates: usize,
}

/// Normalize a batch of raw entries, counting rejections instead of failing.
pub fn normalize_all(entries: &[RawEntry]) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(entries.len());

    for entry in entries {
        match normalize(entry) {
            Ok(pkg) => {
                if seen.insert(pkg.name.clone()) {
                    outcome.packages.push(pkg);
                } else {
                    debug!(name = %pkg.name, "duplicate package name, keeping first occurrence");
                    outcome.duplicates += 1;
                }
            }
            Err(reason) => {
                debug!(%reason, "rejected raw entry");
                outcome.rejected += 1;
            }
        }
    }

    outcome
}

// ---------------------------------------------------------------------------
// Coercion helpers
// ---------------------------------------------------------------------------

fn trimmed(field: &Option<String>) -> String {
    field.as_deref().unwrap_or_default().trim().to_string()
}

/// Coerce a JSON value into a non-negative count. Accepts numbers and
/// numeric strings; anything else (including negatives) is zero.
fn coerce_count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => {
            if let Some(u) = n.as_u64() {
                u
            } else if let Some(f) = n.as_f64() {
                if f > 0.0 { f as u64 } else { 0 }
            } else {
                0
            }
        }
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

/// Coerce a timestamp into canonical epoch milliseconds.
///
/// Accepts integer epoch millis (the registry's native unit), numeric
/// strings, and RFC 3339 text. Unparseable or negative values become 0,
/// the explicit "unknown" sentinel.
fn coerce_epoch_millis(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0).max(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Ok(millis) = s.parse::<i64>() {
                return millis.max(0);
            }
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis().max(0))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Coerce keywords into a lower-cased, deduplicated, sorted list.
/// Accepts a JSON array of strings or a comma/space separated string.
fn coerce_keywords(value: Option<&Value>) -> Vec<String> {
    let mut keywords: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_lowercase())
            .collect(),
        Some(Value::String(s)) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(|s| s.trim().to_lowercase())
            .collect(),
        _ => Vec::new(),
    };

    keywords.retain(|k| !k.is_empty());
    keywords.sort();
    keywords.dedup();
    keywords
}

/// Stringify a loosely-typed id field (the registry sends both strings
/// and numbers here).
fn stringify(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry_from_json(v: serde_json::Value) -> RawEntry {
        serde_json::from_value(v).expect("valid raw entry")
    }

    #[test]
    fn normalizes_well_formed_entry() {
        let entry = entry_from_json(json!({
            "name": "  @ohos/axios  ",
            "description": "HTTP client",
            "org": "ohos",
            "packageType": "HAR",
            "latestVersion": "2.2.0",
            "latestPublishTime": 1_700_000_000_000u64,
            "license": "MIT",
            "keywords": ["HTTP", "network", "http"],
            "likes": 42,
            "points": "95",
            "popularity": 10_000,
            "publisherId": 12345
        }));

        let pkg = normalize(&entry).unwrap();
        assert_eq!(pkg.name, "@ohos/axios");
        assert_eq!(pkg.org, "ohos");
        assert_eq!(pkg.latest_publish_time, 1_700_000_000_000);
        assert_eq!(pkg.keywords, vec!["http", "network"]);
        assert_eq!(pkg.likes, 42);
        assert_eq!(pkg.points, 95);
        assert_eq!(pkg.publisher_id, "12345");
    }

    #[test]
    fn rejects_missing_name() {
        let entry = entry_from_json(json!({"description": "no identity"}));
        assert_eq!(normalize(&entry), Err(RejectReason::MissingName));

        let entry = entry_from_json(json!({"name": "   "}));
        assert_eq!(normalize(&entry), Err(RejectReason::MissingName));
    }

    #[test]
    fn absent_fields_degrade_to_unknown() {
        let entry = entry_from_json(json!({"name": "bare"}));
        let pkg = normalize(&entry).unwrap();
        assert_eq!(pkg.description, "");
        assert_eq!(pkg.license, "");
        assert_eq!(pkg.likes, 0);
        assert_eq!(pkg.latest_publish_time, 0);
        assert!(pkg.keywords.is_empty());
    }

    #[test]
    fn parses_rfc3339_publish_time() {
        let entry = entry_from_json(json!({
            "name": "dated",
            "latestPublishTime": "2024-03-01T12:00:00Z"
        }));
        let pkg = normalize(&entry).unwrap();
        assert_eq!(pkg.latest_publish_time, 1_709_294_400_000);
    }

    #[test]
    fn garbage_timestamp_is_unknown_not_guessed() {
        let entry = entry_from_json(json!({
            "name": "odd",
            "latestPublishTime": "next tuesday",
            "likes": -3
        }));
        let pkg = normalize(&entry).unwrap();
        assert_eq!(pkg.latest_publish_time, 0);
        assert_eq!(pkg.likes, 0);
    }

    #[test]
    fn keywords_from_comma_string() {
        let entry = entry_from_json(json!({
            "name": "kw",
            "keywords": "HTTP, network  sockets"
        }));
        let pkg = normalize(&entry).unwrap();
        assert_eq!(pkg.keywords, vec!["http", "network", "sockets"]);
    }

    #[test]
    fn one_rejection_does_not_poison_the_batch() {
        let entries = vec![
            entry_from_json(json!({"name": "first"})),
            entry_from_json(json!({"description": "nameless"})),
            entry_from_json(json!({"name": "third"})),
        ];

        let outcome = normalize_all(&entries);
        assert_eq!(outcome.packages.len(), 2);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.packages[0].name, "first");
        assert_eq!(outcome.packages[1].name, "third");
    }

    #[test]
    fn duplicate_names_keep_first_occurrence() {
        let entries = vec![
            entry_from_json(json!({"name": "dup", "likes": 1})),
            entry_from_json(json!({"name": "dup", "likes": 2})),
        ];

        let outcome = normalize_all(&entries);
        assert_eq!(outcome.packages.len(), 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.packages[0].likes, 1);
    }

    #[test]
    fn normalization_is_deterministic() {
        let entries = vec![
            entry_from_json(json!({"name": "a", "keywords": ["z", "a", "m"]})),
            entry_from_json(json!({"name": "b", "latestPublishTime": "1000"})),
        ];

        let first = normalize_all(&entries);
        let second = normalize_all(&entries);
        assert_eq!(first.packages, second.packages);
        assert_eq!(first.rejected, second.rejected);
    }
}
