//! Read-only search and aggregation projections over a loaded catalog.
//!
//! Carries no state of its own: every function takes the snapshot as input
//! and filters, sorts, or counts it.

use std::collections::{BTreeMap, HashSet};

use ohpmatlas_shared::{Catalog, CategoryAssignment, FALLBACK_CATEGORY_ID, Package};

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Search parameters. Empty/zero fields mean "no filter".
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Free-text query matched against name, description, and keywords.
    pub query: Option<String>,
    /// Organization filter (case-insensitive equality).
    pub org: Option<String>,
    /// License filter (case-insensitive equality).
    pub license: Option<String>,
    /// Restrict to packages assigned to this category id.
    pub category: Option<String>,
    /// Minimum like count.
    pub min_likes: u64,
    /// Minimum popularity score.
    pub min_popularity: u64,
    /// Maximum results returned; 0 means unlimited.
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: None,
            org: None,
            license: None,
            category: None,
            min_likes: 0,
            min_popularity: 0,
            limit: 20,
        }
    }
}

/// Filter and rank packages: popularity descending, name ascending tie-break.
pub fn search<'a>(catalog: &'a Catalog, query: &SearchQuery) -> Vec<&'a Package> {
    let text = query.query.as_deref().map(str::to_lowercase);
    let org = query.org.as_deref().map(str::to_lowercase);
    let license = query.license.as_deref().map(str::to_lowercase);

    let mut results: Vec<&Package> = catalog
        .packages
        .iter()
        .filter(|pkg| {
            if let Some(text) = &text {
                let hit = pkg.name.to_lowercase().contains(text)
                    || pkg.description.to_lowercase().contains(text)
                    || pkg.keywords.iter().any(|k| k.contains(text));
                if !hit {
                    return false;
                }
            }
            if let Some(org) = &org {
                if pkg.org.to_lowercase() != *org {
                    return false;
                }
            }
            if let Some(license) = &license {
                if pkg.license.to_lowercase() != *license {
                    return false;
                }
            }
            if pkg.likes < query.min_likes || pkg.popularity < query.min_popularity {
                return false;
            }
            if let Some(category) = &query.category {
                let assigned = catalog
                    .assignments
                    .get(&pkg.name)
                    .is_some_and(|a| a.iter().any(|x| x.category_id == *category));
                if !assigned {
                    return false;
                }
            }
            true
        })
        .collect();

    results.sort_by(|a, b| {
        b.popularity
            .cmp(&a.popularity)
            .then_with(|| a.name.cmp(&b.name))
    });

    if query.limit > 0 {
        results.truncate(query.limit);
    }
    results
}

/// A package's assignments sorted by descending score (display order; the
/// snapshot itself stores evaluation order).
pub fn assignments_by_score<'a>(
    catalog: &'a Catalog,
    package_name: &str,
) -> Vec<&'a CategoryAssignment> {
    let mut assignments: Vec<&CategoryAssignment> = catalog
        .assignments
        .get(package_name)
        .map(|a| a.iter().collect())
        .unwrap_or_default();
    assignments.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.category_id.cmp(&b.category_id))
    });
    assignments
}

// ---------------------------------------------------------------------------
// Aggregations
// ---------------------------------------------------------------------------

/// Summary statistics over a snapshot.
#[derive(Debug, Clone)]
pub struct CatalogStats {
    pub total_packages: usize,
    pub total_likes: u64,
    pub avg_popularity: f64,
    pub with_description: usize,
    pub unique_orgs: usize,
    pub unique_licenses: usize,
    pub categorization_rate: f64,
    /// Most popular package (name, popularity).
    pub top_popular: Option<(String, u64)>,
    /// Most liked package (name, likes).
    pub top_liked: Option<(String, u64)>,
}

/// Compute summary statistics for a snapshot.
pub fn stats(catalog: &Catalog) -> CatalogStats {
    let total = catalog.packages.len();
    let total_likes: u64 = catalog.packages.iter().map(|p| p.likes).sum();
    let total_popularity: u64 = catalog.packages.iter().map(|p| p.popularity).sum();

    let orgs: HashSet<&str> = catalog
        .packages
        .iter()
        .filter(|p| !p.org.is_empty())
        .map(|p| p.org.as_str())
        .collect();
    let licenses: HashSet<&str> = catalog
        .packages
        .iter()
        .filter(|p| !p.license.is_empty())
        .map(|p| p.license.as_str())
        .collect();

    CatalogStats {
        total_packages: total,
        total_likes,
        avg_popularity: if total == 0 {
            0.0
        } else {
            total_popularity as f64 / total as f64
        },
        with_description: catalog
            .packages
            .iter()
            .filter(|p| !p.description.is_empty())
            .count(),
        unique_orgs: orgs.len(),
        unique_licenses: licenses.len(),
        categorization_rate: catalog.categorization_rate,
        top_popular: top_by(catalog, |p| p.popularity),
        top_liked: top_by(catalog, |p| p.likes),
    }
}

fn top_by(catalog: &Catalog, key: impl Fn(&Package) -> u64) -> Option<(String, u64)> {
    catalog
        .packages
        .iter()
        .max_by(|a, b| key(a).cmp(&key(b)).then_with(|| b.name.cmp(&a.name)))
        .map(|p| (p.name.clone(), key(p)))
}

/// Package count per organization, sorted by count descending then name.
pub fn org_counts(catalog: &Catalog) -> Vec<(String, usize)> {
    count_by(catalog, |p| {
        if p.org.is_empty() {
            None
        } else {
            Some(p.org.clone())
        }
    })
}

/// Package count per license; unknown licenses group under "Unknown".
pub fn license_counts(catalog: &Catalog) -> Vec<(String, usize)> {
    count_by(catalog, |p| {
        Some(if p.license.is_empty() {
            "Unknown".to_string()
        } else {
            p.license.clone()
        })
    })
}

/// Package count per non-fallback category id.
pub fn category_counts(catalog: &Catalog) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for assignments in catalog.assignments.values() {
        for assignment in assignments {
            if assignment.category_id != FALLBACK_CATEGORY_ID {
                *counts.entry(assignment.category_id.clone()).or_default() += 1;
            }
        }
    }
    sorted_counts(counts)
}

fn count_by(catalog: &Catalog, key: impl Fn(&Package) -> Option<String>) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for package in &catalog.packages {
        if let Some(k) = key(package) {
            *counts.entry(k).or_default() += 1;
        }
    }
    sorted_counts(counts)
}

fn sorted_counts(counts: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut out: Vec<(String, usize)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}
