// src/pipeline/persist.rs

//! Batch persistence coordination.
//!
//! Applies one reconciliation durably: bulk-upsert of new records and bulk
//! deactivation of stale ids, chunked to a fixed size, inside a single
//! store transaction. Either both phases commit or neither does.

use crate::error::{AppError, Result};
use crate::models::{CreativeStatus, NormalizedCreative};
use crate::storage::CreativeStore;

/// Counts and resolved internal ids from one persistence pass.
#[derive(Debug, Clone, Default)]
pub struct PersistOutcome {
    /// Rows inserted or refreshed
    pub inserted: usize,
    /// Rows flipped to inactive
    pub deactivated: usize,
    /// Internal ids of the inserted rows, for downstream dispatch
    pub inserted_local_ids: Vec<u64>,
    /// Internal ids of the deactivated rows
    pub deactivated_local_ids: Vec<u64>,
}

/// Insert records in fixed-size chunks within one transaction.
/// Returns rows affected.
pub async fn insert_chunked(
    store: &dyn CreativeStore,
    records: &[NormalizedCreative],
    chunk_size: usize,
) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut tx = store.begin().await?;
    let mut inserted = 0;
    for chunk in records.chunks(chunk_size.max(1)) {
        inserted += tx
            .bulk_upsert(chunk)
            .await
            .map_err(|e| AppError::persistence(format!("bulk insert failed: {e}")))?;
    }
    tx.commit()
        .await
        .map_err(|e| AppError::persistence(format!("commit failed: {e}")))?;
    Ok(inserted)
}

/// Apply a full reconciliation (insert new + deactivate stale) atomically.
///
/// A failure in either phase drops the transaction, leaving the store as it
/// was before the call.
pub async fn apply_reconciliation(
    store: &dyn CreativeStore,
    source_id: &str,
    new_records: &[NormalizedCreative],
    deactivate_ids: &[String],
    chunk_size: usize,
) -> Result<PersistOutcome> {
    let chunk_size = chunk_size.max(1);
    let mut outcome = PersistOutcome::default();

    if new_records.is_empty() && deactivate_ids.is_empty() {
        return Ok(outcome);
    }

    // Resolve ids of rows about to be deactivated while they still exist.
    outcome.deactivated_local_ids = store
        .local_ids_by_external(source_id, deactivate_ids)
        .await?;

    let mut tx = store.begin().await?;

    for chunk in new_records.chunks(chunk_size) {
        outcome.inserted += tx
            .bulk_upsert(chunk)
            .await
            .map_err(|e| AppError::persistence(format!("bulk insert failed: {e}")))?;
    }

    for chunk in deactivate_ids.chunks(chunk_size) {
        outcome.deactivated += tx
            .bulk_update_status(source_id, chunk, CreativeStatus::Inactive)
            .await
            .map_err(|e| AppError::persistence(format!("bulk deactivate failed: {e}")))?;
    }

    tx.commit()
        .await
        .map_err(|e| AppError::persistence(format!("commit failed: {e}")))?;

    log::info!(
        "Persisted sync for {source_id}: {} inserted, {} deactivated",
        outcome.inserted,
        outcome.deactivated
    );

    let new_ids: Vec<String> = new_records.iter().map(|r| r.external_id.clone()).collect();
    outcome.inserted_local_ids = store.local_ids_by_external(source_id, &new_ids).await?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreativeFormat;
    use crate::normalize::content_hash;
    use crate::storage::LocalStore;

    fn creative(external_id: &str) -> NormalizedCreative {
        NormalizedCreative {
            external_id: external_id.to_string(),
            content_hash: content_hash(external_id, "srcA", "t", "b", "US", "net"),
            title: "t".to_string(),
            body: "b".to_string(),
            country_code: "US".to_string(),
            network_tag: "net".to_string(),
            format: CreativeFormat::Push,
            status: CreativeStatus::Active,
            source_id: "srcA".to_string(),
            icon_url: None,
            image_url: None,
            target_url: None,
            external_created_at: None,
        }
    }

    #[tokio::test]
    async fn insert_chunked_counts_rows() {
        let store = LocalStore::in_memory();
        let records: Vec<_> = (1..=7).map(|i| creative(&i.to_string())).collect();
        let inserted = insert_chunked(&store, &records, 3).await.unwrap();
        assert_eq!(inserted, 7);
        assert_eq!(store.count_for_source("srcA").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn empty_insert_is_a_no_op() {
        let store = LocalStore::in_memory();
        assert_eq!(insert_chunked(&store, &[], 100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reconciliation_applies_both_phases() {
        let store = LocalStore::in_memory();
        insert_chunked(&store, &[creative("1"), creative("2")], 100)
            .await
            .unwrap();

        let outcome = apply_reconciliation(
            &store,
            "srcA",
            &[creative("3")],
            &["1".to_string()],
            100,
        )
        .await
        .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.deactivated, 1);
        assert_eq!(outcome.inserted_local_ids.len(), 1);
        assert_eq!(outcome.deactivated_local_ids.len(), 1);

        let rows = store.rows_for_source("srcA");
        let one = rows.iter().find(|r| r.creative.external_id == "1").unwrap();
        assert_eq!(one.creative.status, CreativeStatus::Inactive);
        assert!(rows.iter().any(|r| r.creative.external_id == "3"));
    }

    #[tokio::test]
    async fn chunking_covers_every_record() {
        let store = LocalStore::in_memory();
        let records: Vec<_> = (1..=250).map(|i| creative(&i.to_string())).collect();
        let outcome = apply_reconciliation(&store, "srcA", &records, &[], 100)
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 250);
        assert_eq!(store.count_for_source("srcA").await.unwrap(), 250);
    }

    #[tokio::test]
    async fn nothing_to_do_returns_default() {
        let store = LocalStore::in_memory();
        let outcome = apply_reconciliation(&store, "srcA", &[], &[], 100).await.unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.deactivated, 0);
    }

    /// Store whose transactions accept inserts but refuse status updates.
    struct BrokenDeactivateStore {
        inner: LocalStore,
    }

    struct BrokenDeactivateTx {
        inner: Box<dyn crate::storage::StoreTx>,
    }

    #[async_trait::async_trait]
    impl crate::storage::StoreTx for BrokenDeactivateTx {
        async fn bulk_upsert(&mut self, records: &[NormalizedCreative]) -> Result<usize> {
            self.inner.bulk_upsert(records).await
        }

        async fn bulk_update_status(
            &mut self,
            _source_id: &str,
            _external_ids: &[String],
            _status: CreativeStatus,
        ) -> Result<usize> {
            Err(AppError::persistence("injected deactivate failure"))
        }

        async fn commit(self: Box<Self>) -> Result<()> {
            self.inner.commit().await
        }
    }

    #[async_trait::async_trait]
    impl CreativeStore for BrokenDeactivateStore {
        async fn exists_by_hash(&self, hash: &str) -> Result<bool> {
            self.inner.exists_by_hash(hash).await
        }

        async fn existing_external_ids(
            &self,
            source_id: &str,
        ) -> Result<std::collections::HashSet<String>> {
            self.inner.existing_external_ids(source_id).await
        }

        async fn local_ids_by_external(
            &self,
            source_id: &str,
            external_ids: &[String],
        ) -> Result<Vec<u64>> {
            self.inner.local_ids_by_external(source_id, external_ids).await
        }

        async fn count_for_source(&self, source_id: &str) -> Result<usize> {
            self.inner.count_for_source(source_id).await
        }

        async fn begin(&self) -> Result<Box<dyn crate::storage::StoreTx>> {
            Ok(Box::new(BrokenDeactivateTx {
                inner: self.inner.begin().await?,
            }))
        }

        async fn purge_inactive(&self, source_id: &str, older_than_days: i64) -> Result<usize> {
            self.inner.purge_inactive(source_id, older_than_days).await
        }
    }

    #[tokio::test]
    async fn failed_deactivate_rolls_back_inserts() {
        let inner = LocalStore::in_memory();
        insert_chunked(&inner, &[creative("1")], 100).await.unwrap();
        let store = BrokenDeactivateStore { inner };

        let err = apply_reconciliation(
            &store,
            "srcA",
            &[creative("2")],
            &["1".to_string()],
            100,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));

        // Neither phase is visible: no new row, old row still active.
        assert_eq!(store.inner.count_for_source("srcA").await.unwrap(), 1);
        let rows = store.inner.rows_for_source("srcA");
        assert_eq!(rows[0].creative.status, CreativeStatus::Active);
    }
}
