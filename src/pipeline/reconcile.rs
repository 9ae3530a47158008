// src/pipeline/reconcile.rs

//! Set reconciliation for snapshot sources.
//!
//! Given the complete set of external ids observed in one full API crawl
//! and the set currently persisted for the source, classifies ids as new
//! (insert), deactivated (flip to inactive) or unchanged.
//!
//! Precondition: the crawl must be exhaustive. Reconciling a partial crawl
//! would wrongly deactivate every record the crawl did not reach; callers
//! enforce this with the crawl's `exhaustive` flag.

use std::collections::HashSet;

/// Outcome of comparing an API snapshot against persisted state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Present in the API crawl, absent in the store
    pub new_ids: Vec<String>,
    /// Present in the store, absent in the API crawl
    pub deactivated_ids: Vec<String>,
    /// Persisted records also seen in the crawl
    pub unchanged_count: usize,
}

impl Reconciliation {
    /// Whether the snapshot brought any change at all.
    pub fn has_changes(&self) -> bool {
        !self.new_ids.is_empty() || !self.deactivated_ids.is_empty()
    }
}

/// Compute the reconciliation between an API id list and the stored id set.
///
/// Duplicate api ids are collapsed first; output order follows first
/// appearance for `new_ids` and is sorted for `deactivated_ids` so results
/// are deterministic. `unchanged_count + deactivated_ids.len()` always
/// equals the store count before the run.
pub fn reconcile(api_ids: &[String], db_ids: &HashSet<String>) -> Reconciliation {
    let mut seen = HashSet::new();
    let mut api_set = HashSet::new();
    let mut new_ids = Vec::new();

    for id in api_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        api_set.insert(id.as_str());
        if !db_ids.contains(id) {
            new_ids.push(id.clone());
        }
    }

    let mut deactivated_ids: Vec<String> = db_ids
        .iter()
        .filter(|id| !api_set.contains(id.as_str()))
        .cloned()
        .collect();
    deactivated_ids.sort_unstable();

    Reconciliation {
        unchanged_count: db_ids.len() - deactivated_ids.len(),
        new_ids,
        deactivated_ids,
    }
}
