// src/pipeline/dedup.rs

//! Content-hash deduplication for cursor sources.

use std::collections::HashSet;

use crate::error::Result;
use crate::models::NormalizedCreative;
use crate::storage::CreativeStore;

/// Checks whether a creative's content is already known.
///
/// The store lookup is the source of truth; the in-memory seen-set only
/// short-circuits hashes already encountered earlier in the same run, which
/// also catches duplicates within a page before they reach the store.
pub struct DedupIndex<'a> {
    store: &'a dyn CreativeStore,
    seen: HashSet<String>,
}

impl<'a> DedupIndex<'a> {
    /// New index for one run.
    pub fn new(store: &'a dyn CreativeStore) -> Self {
        Self {
            store,
            seen: HashSet::new(),
        }
    }

    /// Whether this creative's content hash already exists. Marks the hash
    /// as seen either way, so the caller inserts it at most once per run.
    pub async fn is_duplicate(&mut self, record: &NormalizedCreative) -> Result<bool> {
        if !self.seen.insert(record.content_hash.clone()) {
            return Ok(true);
        }
        self.store.exists_by_hash(&record.content_hash).await
    }
}
