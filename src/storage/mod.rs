// src/storage/mod.rs

//! Storage abstractions for creative persistence.
//!
//! The synchronization core treats the record store as an external
//! collaborator: keyed upsert, existence checks and bulk status updates,
//! with the insert+deactivate pair of one reconciliation applied atomically
//! through a [`StoreTx`]. Dropping a transaction without committing it
//! discards every staged change.

pub mod local;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CreativeStatus, NormalizedCreative, SourceState};

// Re-export for convenience
pub use local::LocalStore;

/// One open store transaction. Writes are applied to a private view and
/// become visible to readers only at `commit`.
#[async_trait]
pub trait StoreTx: Send {
    /// Insert records, updating in place when the `(source_id, external_id)`
    /// key or the content hash already exists. Returns rows affected.
    async fn bulk_upsert(&mut self, records: &[NormalizedCreative]) -> Result<usize>;

    /// Set the status of every matching record of one source. Returns rows
    /// affected.
    async fn bulk_update_status(
        &mut self,
        source_id: &str,
        external_ids: &[String],
        status: CreativeStatus,
    ) -> Result<usize>;

    /// Atomically publish all staged changes.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Read and transaction entry points of the creative store.
#[async_trait]
pub trait CreativeStore: Send + Sync {
    /// Whether any record with this content hash exists (any source).
    async fn exists_by_hash(&self, hash: &str) -> Result<bool>;

    /// All external ids currently persisted for one source.
    async fn existing_external_ids(&self, source_id: &str) -> Result<HashSet<String>>;

    /// Resolve store-internal ids for a set of external ids of one source.
    async fn local_ids_by_external(
        &self,
        source_id: &str,
        external_ids: &[String],
    ) -> Result<Vec<u64>>;

    /// Total records persisted for one source.
    async fn count_for_source(&self, source_id: &str) -> Result<usize>;

    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Delete records of one source that have been inactive longer than the
    /// given number of days. Returns rows removed.
    async fn purge_inactive(&self, source_id: &str, older_than_days: i64) -> Result<usize>;
}

/// Persistence for per-source run state.
#[async_trait]
pub trait SourceStateStore: Send + Sync {
    /// Load the state for one source, if it was ever saved.
    async fn load(&self, source_id: &str) -> Result<Option<SourceState>>;

    /// Persist the state, stamping `updated_at`.
    async fn save(&self, state: &SourceState) -> Result<()>;
}
