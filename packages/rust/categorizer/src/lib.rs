//! Keyword-scoring categorizer.
//!
//! Applies a [`RuleSet`] to normalized packages. For each package a
//! case-folded text surface is built from its name (org prefix stripped),
//! description, and keywords; each category's weighted terms are then matched
//! with three strategies whose contributions sum:
//!
//! 1. exact phrase (word-boundary contiguous match) — `weight × 1.0`
//! 2. exact token — `weight × 0.7`
//! 3. partial/stem (min 4 chars) — `weight × 0.3`
//!
//! The raw sum is normalized by the category's maximum attainable score into
//! a (0, 1] confidence; assignments below the configured threshold are never
//! emitted. Packages clearing no category land in the reserved fallback
//! bucket. Evaluation is deterministic: categories iterate in id order.

pub mod rules;

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, instrument};

use ohpmatlas_shared::{CategoryAssignment, FALLBACK_CATEGORY_ID, Package};

pub use rules::{Category, RuleSet, TermWeight};

/// Contribution multiplier for an exact phrase match.
const PHRASE_WEIGHT: f64 = 1.0;
/// Contribution multiplier for an exact token match.
const TOKEN_WEIGHT: f64 = 0.7;
/// Contribution multiplier for a partial/stem match.
const PARTIAL_WEIGHT: f64 = 0.3;
/// A term matching all three ways contributes `weight × MAX_STRATEGY_SUM`.
const MAX_STRATEGY_SUM: f64 = PHRASE_WEIGHT + TOKEN_WEIGHT + PARTIAL_WEIGHT;
/// Minimum length of the shorter side of a partial match.
const MIN_PARTIAL_LEN: usize = 4;

// ---------------------------------------------------------------------------
// Categorizer
// ---------------------------------------------------------------------------

/// Applies a rule set to packages at a fixed confidence threshold.
pub struct Categorizer {
    rules: RuleSet,
    threshold: f64,
}

/// Outcome of categorizing a full package set.
#[derive(Debug, Clone)]
pub struct CategorizeOutcome {
    /// Assignments keyed by package name, each vector in category-evaluation
    /// (id-sorted) order.
    pub assignments: BTreeMap<String, Vec<CategoryAssignment>>,
    /// Packages with at least one non-fallback assignment.
    pub categorized: usize,
    /// `categorized ÷ total` (0.0 for an empty input).
    pub categorization_rate: f64,
    /// Package count per category id, fallback included.
    pub category_counts: BTreeMap<String, usize>,
}

impl Categorizer {
    /// Create a categorizer over `rules` with the given confidence threshold.
    pub fn new(rules: RuleSet, threshold: f64) -> Self {
        Self { rules, threshold }
    }

    /// The rule set this categorizer evaluates.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Categorize a single package.
    ///
    /// Returns at least one assignment: real categories clearing the
    /// threshold, or the fallback bucket when none do.
    pub fn categorize(&self, package: &Package) -> Vec<CategoryAssignment> {
        let surface = Surface::build(package);
        let mut assignments = Vec::new();

        for category in self.rules.categories() {
            let score = score_category(category, &surface);
            // Scores live in (0, 1]: a zero score is never an assignment,
            // whatever the threshold.
            if score > 0.0 && score >= self.threshold {
                assignments.push(CategoryAssignment {
                    category_id: category.id.clone(),
                    score,
                });
            }
        }

        if assignments.is_empty() {
            assignments.push(CategoryAssignment {
                category_id: FALLBACK_CATEGORY_ID.to_string(),
                score: 1.0,
            });
        }

        assignments
    }

    /// Categorize every package, reporting the categorization rate.
    #[instrument(skip_all, fields(packages = packages.len(), threshold = self.threshold))]
    pub fn categorize_all(&self, packages: &[Package]) -> CategorizeOutcome {
        let mut assignments = BTreeMap::new();
        let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut categorized = 0;

        for package in packages {
            let package_assignments = self.categorize(package);

            let real = package_assignments
                .iter()
                .any(|a| a.category_id != FALLBACK_CATEGORY_ID);
            if real {
                categorized += 1;
            } else {
                debug!(name = %package.name, "no category cleared the threshold, using fallback");
            }

            for assignment in &package_assignments {
                *category_counts
                    .entry(assignment.category_id.clone())
                    .or_default() += 1;
            }

            assignments.insert(package.name.clone(), package_assignments);
        }

        let categorization_rate = if packages.is_empty() {
            0.0
        } else {
            categorized as f64 / packages.len() as f64
        };

        CategorizeOutcome {
            assignments,
            categorized,
            categorization_rate,
            category_counts,
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score one category against a prepared surface, normalized into [0, 1].
fn score_category(category: &Category, surface: &Surface) -> f64 {
    let total_weight = category.total_weight();
    if total_weight <= 0.0 {
        return 0.0;
    }

    let mut raw = 0.0;
    for tw in &category.terms {
        let mut hit = 0.0;
        if surface.contains_phrase(&tw.term) {
            hit += PHRASE_WEIGHT;
        }
        if surface.has_token(&tw.term) {
            hit += TOKEN_WEIGHT;
        }
        if surface.has_partial(&tw.term) {
            hit += PARTIAL_WEIGHT;
        }
        raw += tw.weight * hit;
    }

    (raw / (total_weight * MAX_STRATEGY_SUM)).min(1.0)
}

// ---------------------------------------------------------------------------
// Text surface
// ---------------------------------------------------------------------------

/// Case-folded searchable text for one package, with a token index.
struct Surface {
    text: String,
    tokens: Vec<String>,
    token_set: HashSet<String>,
}

impl Surface {
    fn build(package: &Package) -> Self {
        let mut parts = Vec::with_capacity(2 + package.keywords.len());
        parts.push(strip_org_prefix(&package.name).to_lowercase());
        parts.push(package.description.to_lowercase());
        parts.extend(package.keywords.iter().map(|k| k.to_lowercase()));

        let text = parts.join(" ");
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let token_set = tokens.iter().cloned().collect();

        Self {
            text,
            tokens,
            token_set,
        }
    }

    /// Word-boundary contiguous occurrence of `term` (which may span words).
    fn contains_phrase(&self, term: &str) -> bool {
        if term.is_empty() {
            return false;
        }
        let text = self.text.as_str();
        let mut start = 0;
        while start <= text.len() {
            let Some(pos) = text[start..].find(term) else {
                return false;
            };
            let at = start + pos;
            let end = at + term.len();
            let before_ok = text[..at]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric());
            let after_ok = text[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
            if before_ok && after_ok {
                return true;
            }
            start = end;
        }
        false
    }

    /// A surface token equals the term exactly (single-word terms only).
    fn has_token(&self, term: &str) -> bool {
        !term.contains(' ') && self.token_set.contains(term)
    }

    /// The term is a substring of a token or vice versa; the shorter side
    /// must be at least [`MIN_PARTIAL_LEN`] characters.
    fn has_partial(&self, term: &str) -> bool {
        let term_chars = term.chars().count();
        self.tokens.iter().any(|token| {
            (term_chars >= MIN_PARTIAL_LEN && token.contains(term))
                || (token.chars().count() >= MIN_PARTIAL_LEN && term.contains(token.as_str()))
        })
    }
}

/// Strip a leading `@org/` namespace from a package name.
fn strip_org_prefix(name: &str) -> &str {
    if let Some(rest) = name.strip_prefix('@') {
        if let Some((_, tail)) = rest.split_once('/') {
            return tail;
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use ohpmatlas_shared::Package;

    fn package(name: &str, description: &str, keywords: &[&str]) -> Package {
        Package {
            name: name.into(),
            description: description.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            ..minimal(name)
        }
    }

    fn minimal(name: &str) -> Package {
        Package {
            name: name.into(),
            org: String::new(),
            package_type: String::new(),
            description: String::new(),
            keywords: Vec::new(),
            latest_version: String::new(),
            latest_publish_time: 0,
            license: String::new(),
            author_name: String::new(),
            publisher_id: String::new(),
            publisher_name: String::new(),
            likes: 0,
            points: 0,
            popularity: 0,
        }
    }

    fn three_term_networking() -> RuleSet {
        RuleSet::from_toml_str(
            r#"
[[categories]]
id = "networking"
display_name = "Networking & APIs"
icon = "🌐"
terms = [
  { term = "http", weight = 1.0 },
  { term = "network", weight = 0.8 },
  { term = "request", weight = 0.5 },
]

[[categories]]
id = "gaming-graphics"
display_name = "Gaming & Graphics"
icon = "🎮"
terms = [
  { term = "game", weight = 1.0 },
  { term = "shader", weight = 0.9 },
]
"#,
        )
        .unwrap()
    }

    #[test]
    fn hilog_scenario_assigns_networking_only() {
        let categorizer = Categorizer::new(three_term_networking(), 0.15);
        let pkg = package(
            "hilog",
            "fast async http client for network requests",
            &["network", "http"],
        );

        let assignments = categorizer.categorize(&pkg);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].category_id, "networking");
        assert!(assignments[0].score >= 0.15);
        assert!(assignments[0].score <= 1.0);
    }

    #[test]
    fn phrase_outweighs_partial() {
        let rules = RuleSet::from_toml_str(
            r#"
[[categories]]
id = "a"
display_name = "A"
icon = "x"
terms = [{ term = "request", weight = 1.0 }]
"#,
        )
        .unwrap();
        let categorizer = Categorizer::new(rules, 0.0);

        // "request" as a standalone word: phrase + token + partial all fire.
        let exact = categorizer.categorize(&package("p1", "request helper", &[]));
        // "requests" only partial-matches.
        let partial = categorizer.categorize(&package("p2", "requests helper", &[]));

        assert!(exact[0].score > partial[0].score);
        assert!((exact[0].score - 1.0).abs() < 1e-9);
        assert!((partial[0].score - PARTIAL_WEIGHT / MAX_STRATEGY_SUM).abs() < 1e-9);
    }

    #[test]
    fn short_fragments_do_not_partial_match() {
        let rules = RuleSet::from_toml_str(
            r#"
[[categories]]
id = "a"
display_name = "A"
icon = "x"
terms = [{ term = "log", weight = 1.0 }]
"#,
        )
        .unwrap();
        let categorizer = Categorizer::new(rules, 0.01);

        // "hilog" contains "log" but the fragment is under the minimum
        // length and not word-bounded, so nothing fires.
        let assignments = categorizer.categorize(&package("hilog", "", &[]));
        assert_eq!(assignments[0].category_id, FALLBACK_CATEGORY_ID);
    }

    #[test]
    fn multi_word_phrase_matches_contiguously() {
        let rules = RuleSet::from_toml_str(
            r#"
[[categories]]
id = "ml"
display_name = "ML"
icon = "x"
terms = [{ term = "machine learning", weight = 1.0 }]
"#,
        )
        .unwrap();
        let categorizer = Categorizer::new(rules, 0.2);

        let hit = categorizer.categorize(&package("m", "on-device machine learning", &[]));
        assert_eq!(hit[0].category_id, "ml");

        // Words present but not contiguous: only the token-in-phrase partial
        // contribution remains, which stays under the threshold.
        let miss = categorizer.categorize(&package("m", "machine for learning", &[]));
        assert_eq!(miss[0].category_id, FALLBACK_CATEGORY_ID);
    }

    #[test]
    fn org_prefix_is_stripped_from_surface() {
        let categorizer = Categorizer::new(three_term_networking(), 0.15);
        let pkg = package("@ohos/http", "", &[]);

        let assignments = categorizer.categorize(&pkg);
        assert_eq!(assignments[0].category_id, "networking");
    }

    #[test]
    fn fallback_bucket_for_unmatched_packages() {
        let categorizer = Categorizer::new(three_term_networking(), 0.15);
        let pkg = package("mystery", "completely unrelated text", &[]);

        let assignments = categorizer.categorize(&pkg);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].category_id, FALLBACK_CATEGORY_ID);
        assert!((assignments[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn multiple_categories_allowed() {
        let categorizer = Categorizer::new(three_term_networking(), 0.15);
        let pkg = package("netgame", "http network game with shader effects", &[]);

        let assignments = categorizer.categorize(&pkg);
        let ids: Vec<_> = assignments.iter().map(|a| a.category_id.as_str()).collect();
        assert_eq!(ids, vec!["gaming-graphics", "networking"]);
    }

    #[test]
    fn assignments_follow_category_evaluation_order() {
        // Storage order is id-sorted evaluation order, not score order.
        let categorizer = Categorizer::new(three_term_networking(), 0.1);
        let pkg = package("x", "game engine with http network support", &[]);

        let assignments = categorizer.categorize(&pkg);
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].category_id, "gaming-graphics");
        assert_eq!(assignments[1].category_id, "networking");
        // Networking scores higher here, yet storage keeps evaluation order.
        assert!(assignments[1].score > assignments[0].score);
    }

    #[test]
    fn determinism_identical_runs_identical_output() {
        let categorizer = Categorizer::new(RuleSet::builtin(), 0.15);
        let packages = vec![
            package("@ohos/axios", "promise based http client", &["http", "network"]),
            package("crypto-js", "aes and rsa encryption toolkit", &["encrypt"]),
            package("lottie", "render After Effects animations", &["animation"]),
            package("nameless", "zzz", &[]),
        ];

        let first = categorizer.categorize_all(&packages);
        let second = categorizer.categorize_all(&packages);

        let a = serde_json::to_string(&first.assignments).unwrap();
        let b = serde_json::to_string(&second.assignments).unwrap();
        assert_eq!(a, b);
        assert_eq!(first.categorization_rate, second.categorization_rate);
    }

    #[test]
    fn threshold_monotonicity() {
        let packages = vec![
            package("@ohos/axios", "promise based http client", &["http", "network"]),
            package("sqlite-helper", "sqlite database orm with cache", &["database"]),
            package("vague", "some helper", &[]),
        ];

        let mut previous_total = usize::MAX;
        for threshold in [0.05, 0.15, 0.3, 0.6, 0.9] {
            let categorizer = Categorizer::new(RuleSet::builtin(), threshold);
            let outcome = categorizer.categorize_all(&packages);
            let total: usize = outcome
                .assignments
                .values()
                .map(|a| {
                    a.iter()
                        .filter(|x| x.category_id != FALLBACK_CATEGORY_ID)
                        .count()
                })
                .sum();
            assert!(
                total <= previous_total,
                "raising the threshold added assignments at {threshold}"
            );
            previous_total = total;
        }
    }

    #[test]
    fn builtin_rules_reach_coverage_target() {
        // Representative slice of the registry's vocabulary.
        let packages = vec![
            package("@ohos/axios", "promise based http client for network requests", &["http"]),
            package("crypto-lib", "aes rsa encrypt decrypt toolkit", &["crypto", "security"]),
            package("sqlite-orm", "lightweight sqlite database orm", &["database", "storage"]),
            package("lottie-player", "lottie animation player with easing", &["animation"]),
            package("map-kit", "gps location and map markers", &["location", "map"]),
            package("video-player", "audio and video player with codec support", &["media"]),
            package("mqtt-client", "mqtt client for iot devices", &["iot", "mqtt"]),
            package("unit-runner", "unit test runner with mock and assertion helpers", &["testing"]),
            package("date-utils", "common util helper for date and string format", &["util"]),
            package("share-sdk", "social share to wechat and weibo", &["share"]),
            package("router-x", "page router with deep link navigation", &["router"]),
            package("enigma", "???", &[]),
        ];

        let categorizer = Categorizer::new(RuleSet::builtin(), 0.15);
        let outcome = categorizer.categorize_all(&packages);

        assert!(
            outcome.categorization_rate >= 0.9,
            "categorization rate {} below target",
            outcome.categorization_rate
        );
        // The deliberately opaque package still lands somewhere.
        assert_eq!(
            outcome.assignments["enigma"][0].category_id,
            FALLBACK_CATEGORY_ID
        );
    }

    #[test]
    fn category_counts_include_fallback() {
        let categorizer = Categorizer::new(three_term_networking(), 0.15);
        let packages = vec![
            package("a", "http network client", &[]),
            package("b", "opaque", &[]),
        ];

        let outcome = categorizer.categorize_all(&packages);
        assert_eq!(outcome.category_counts["networking"], 1);
        assert_eq!(outcome.category_counts[FALLBACK_CATEGORY_ID], 1);
        assert_eq!(outcome.categorized, 1);
        assert!((outcome.categorization_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        // Even with no threshold, only genuinely matching categories emit
        // assignments, and every score stays in (0, 1].
        let categorizer = Categorizer::new(RuleSet::builtin(), 0.0);
        let pkg = package(
            "everything",
            "http network request api websocket rest rpc socket download axios",
            &["http", "network", "request"],
        );

        for assignment in categorizer.categorize(&pkg) {
            assert!(assignment.score > 0.0);
            assert!(assignment.score <= 1.0);
        }
    }
}
