// src/pipeline/snapshot.rs

//! Full-snapshot synchronization.
//!
//! Crawls the source's entire active set page by page, then reconciles the
//! observed external ids against the store: ids missing from the store are
//! inserted, ids missing from the crawl are deactivated, both inside one
//! transaction.
//!
//! Deactivation is only safe when the crawl was exhaustive — a partial
//! crawl would deactivate everything it failed to reach. The crawl result
//! carries an `exhaustive` flag and a partial crawl degrades to insert-only.

use std::collections::HashSet;
use std::time::Instant;

use crate::client::SnapshotSource;
use crate::dispatch::CreativeEvents;
use crate::error::{AppError, Result};
use crate::models::{
    NormalizedCreative, RawCreative, RunResult, RunStats, SourceConfig, StopReason,
};
use crate::normalize::Normalizer;
use crate::storage::{CreativeStore, SourceStateStore};

use super::persist::apply_reconciliation;
use super::reconcile::reconcile;
use super::tracker::RunTracker;
use super::{CancelToken, RunParams};

/// Result of one full crawl.
#[derive(Debug, Default)]
pub struct SnapshotCrawl {
    /// Raw records from every fetched page
    pub records: Vec<RawCreative>,
    /// Non-empty pages fetched
    pub pages: u32,
    /// Whether the crawl saw the genuine end of pagination
    pub exhaustive: bool,
}

/// Snapshot-mode pipeline for one source.
pub struct SnapshotPipeline<'a> {
    fetcher: &'a dyn SnapshotSource,
    store: &'a dyn CreativeStore,
    tracker: RunTracker<'a>,
    normalizer: Normalizer,
    source: &'a SourceConfig,
    events: &'a dyn CreativeEvents,
    params: RunParams,
}

impl<'a> SnapshotPipeline<'a> {
    /// Wire up a pipeline from its collaborators.
    pub fn new(
        fetcher: &'a dyn SnapshotSource,
        store: &'a dyn CreativeStore,
        states: &'a dyn SourceStateStore,
        source: &'a SourceConfig,
        events: &'a dyn CreativeEvents,
        params: RunParams,
    ) -> Self {
        Self {
            fetcher,
            store,
            tracker: RunTracker::new(states, params.stale_run_minutes),
            normalizer: Normalizer::new(&source.id, source.fields.clone()),
            source,
            events,
            params,
        }
    }

    /// Execute one full crawl-and-reconcile run.
    pub async fn run(&self, cancel: &CancelToken) -> Result<RunResult> {
        let started = Instant::now();
        let mut state = self.tracker.begin(self.source).await?;
        let mut stats = RunStats::default();

        match self.run_inner(&mut stats, cancel).await {
            Ok(reason) => {
                self.tracker.complete(&mut state).await?;
                let result = self.build_result(stats, started, reason, false);
                log::info!(
                    "Source {}: {} observed, {} new, {} deactivated, {} unchanged in {:.2}s",
                    self.source.id,
                    result.stats.processed,
                    result.stats.new_count,
                    result.stats.deactivated_count,
                    result.stats.unchanged_count,
                    result.duration_seconds
                );
                Ok(result)
            }
            Err(e) => {
                self.tracker
                    .fail(&mut state, "snapshot_run", &e.to_string(), stats)
                    .await?;
                Err(e)
            }
        }
    }

    /// Compute would-be reconciliation counts without writing.
    /// Requires `params.dry_run`.
    pub async fn dry_run(&self, cancel: &CancelToken) -> Result<RunResult> {
        let started = Instant::now();
        let mut stats = RunStats::default();
        let reason = self.run_inner(&mut stats, cancel).await?;
        Ok(self.build_result(stats, started, reason, true))
    }

    /// Crawl pages until the upstream reports the end of its data.
    ///
    /// First-page failures abort; later-page failures, cancellation and the
    /// page cap all end the crawl early with `exhaustive` left unset.
    pub async fn fetch_all(&self, cancel: &CancelToken) -> Result<SnapshotCrawl> {
        let mut crawl = SnapshotCrawl::default();
        let mut page_no = self.params.start_page;

        while page_no <= self.params.max_pages {
            if cancel.is_cancelled() {
                log::warn!("Source {}: crawl cancelled at page {page_no}", self.source.id);
                return Ok(crawl);
            }

            match self.fetcher.fetch_page(page_no).await {
                Ok(page) if page.is_empty() => {
                    log::info!("Source {}: no more data at page {page_no}", self.source.id);
                    crawl.exhaustive = true;
                    return Ok(crawl);
                }
                Ok(page) => {
                    crawl.pages += 1;
                    log::debug!(
                        "Source {}: page {page_no} fetched ({} items, {} total)",
                        self.source.id,
                        page.len(),
                        crawl.records.len() + page.len()
                    );
                    crawl.records.extend(page);
                }
                Err(AppError::PageNotFound { .. }) if page_no > self.params.start_page => {
                    // The upstream 404s one past its last page.
                    crawl.exhaustive = true;
                    return Ok(crawl);
                }
                Err(e) if page_no == self.params.start_page => return Err(e),
                Err(e) => {
                    log::warn!(
                        "Source {}: page {page_no} failed, continuing with partial crawl: {e}",
                        self.source.id
                    );
                    return Ok(crawl);
                }
            }

            page_no += 1;
            if page_no <= self.params.max_pages {
                tokio::time::sleep(self.params.page_delay).await;
            }
        }

        log::warn!(
            "Source {}: page cap {} reached, treating crawl as partial",
            self.source.id,
            self.params.max_pages
        );
        Ok(crawl)
    }

    async fn run_inner(&self, stats: &mut RunStats, cancel: &CancelToken) -> Result<StopReason> {
        let crawl = self.fetch_all(cancel).await?;
        stats.processed = crawl.records.len();
        stats.batches_processed = crawl.pages as usize;

        let mut normalized = Vec::new();
        for raw in &crawl.records {
            match self.normalizer.normalize(raw) {
                Ok(record) => normalized.push(record),
                Err(e) => {
                    stats.errors += 1;
                    log::debug!("Source {}: record skipped: {e}", self.source.id);
                }
            }
        }

        let api_ids: Vec<String> = normalized.iter().map(|r| r.external_id.clone()).collect();
        let db_ids = self.store.existing_external_ids(&self.source.id).await?;
        let reconciliation = reconcile(&api_ids, &db_ids);

        if !crawl.exhaustive && !reconciliation.deactivated_ids.is_empty() {
            log::warn!(
                "Source {}: partial crawl, withholding deactivation of {} records",
                self.source.id,
                reconciliation.deactivated_ids.len()
            );
        }
        let deactivate: &[String] = if crawl.exhaustive {
            &reconciliation.deactivated_ids
        } else {
            &[]
        };

        let new_records = pick_new_records(normalized, &reconciliation.new_ids);
        stats.new_count = new_records.len();
        stats.deactivated_count = deactivate.len();
        stats.unchanged_count = reconciliation.unchanged_count;

        let reason = if cancel.is_cancelled() {
            StopReason::Cancelled
        } else {
            StopReason::ReachedEnd
        };

        if self.params.dry_run {
            stats.saved = new_records.len();
            return Ok(reason);
        }

        let outcome = apply_reconciliation(
            self.store,
            &self.source.id,
            &new_records,
            deactivate,
            self.params.chunk_size,
        )
        .await?;
        stats.saved = outcome.inserted;
        stats.deactivated_count = outcome.deactivated;

        if !outcome.inserted_local_ids.is_empty() {
            self.events.inserted(&outcome.inserted_local_ids).await;
        }
        if !outcome.deactivated_local_ids.is_empty() {
            self.events.deactivated(&outcome.deactivated_local_ids).await;
        }

        Ok(reason)
    }

    fn build_result(
        &self,
        stats: RunStats,
        started: Instant,
        reason: StopReason,
        dry_run: bool,
    ) -> RunResult {
        RunResult {
            source_id: self.source.id.clone(),
            stats,
            duration_seconds: (started.elapsed().as_secs_f64() * 100.0).round() / 100.0,
            final_cursor: None,
            reason,
            dry_run,
        }
    }
}

/// Keep the first normalized record for each new external id.
fn pick_new_records(records: Vec<NormalizedCreative>, new_ids: &[String]) -> Vec<NormalizedCreative> {
    let wanted: HashSet<&str> = new_ids.iter().map(String::as_str).collect();
    let mut taken = HashSet::new();
    records
        .into_iter()
        .filter(|r| wanted.contains(r.external_id.as_str()) && taken.insert(r.external_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::RecordingEvents;
    use crate::models::{Config, CreativeStatus, SourceKind, SourceStatus};
    use crate::pipeline::persist::insert_chunked;
    use crate::storage::LocalStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn item(id: u64) -> RawCreative {
        json!({
            "id": id,
            "title": format!("Creative {id}"),
            "text": "Tap here",
            "country": "US",
            "adNetwork": "direct",
            "format": "push"
        })
    }

    struct PagedSource {
        pages: Vec<Result<Vec<RawCreative>>>,
        calls: Mutex<Vec<u32>>,
    }

    impl PagedSource {
        fn new(pages: Vec<Result<Vec<RawCreative>>>) -> Self {
            Self {
                pages,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for PagedSource {
        async fn fetch_page(&self, page: u32) -> Result<Vec<RawCreative>> {
            self.calls.lock().unwrap().push(page);
            let index = (page as usize).saturating_sub(1);
            match self.pages.get(index) {
                Some(Ok(items)) => Ok(items.clone()),
                Some(Err(e)) => Err(AppError::fetch("http://x", e.to_string())),
                None => Ok(Vec::new()),
            }
        }
    }

    fn params() -> RunParams {
        RunParams {
            max_items_per_run: 1000,
            batch_size: 200,
            chunk_size: 100,
            max_pages: 100,
            start_page: 1,
            page_delay: Duration::ZERO,
            stale_run_minutes: 10,
            dry_run: false,
        }
    }

    fn source_config() -> SourceConfig {
        let mut config = Config::default().sources[1].clone();
        config.id = "srcB".into();
        config.kind = SourceKind::Snapshot;
        config
    }

    async fn seed(store: &LocalStore, source: &SourceConfig, ids: &[u64]) {
        let normalizer = Normalizer::new(&source.id, source.fields.clone());
        let records: Vec<_> = ids
            .iter()
            .map(|id| normalizer.normalize(&item(*id)).unwrap())
            .collect();
        insert_chunked(store, &records, 100).await.unwrap();
    }

    #[tokio::test]
    async fn reconciles_new_and_removed() {
        let store = LocalStore::in_memory();
        let source = source_config();
        // Store holds {1,2,3,4}; the crawl returns {3,4,5}.
        seed(&store, &source, &[1, 2, 3, 4]).await;

        let fetcher = PagedSource::new(vec![Ok(vec![item(3), item(4), item(5)]), Ok(Vec::new())]);
        let events = RecordingEvents::default();
        let pipeline =
            SnapshotPipeline::new(&fetcher, &store, &store, &source, &events, params());

        let result = pipeline.run(&CancelToken::new()).await.unwrap();

        assert_eq!(result.stats.new_count, 1);
        assert_eq!(result.stats.deactivated_count, 2);
        assert_eq!(result.stats.unchanged_count, 2);
        assert_eq!(result.reason, StopReason::ReachedEnd);

        let rows = store.rows_for_source("srcB");
        assert_eq!(rows.len(), 5);
        for id in ["1", "2"] {
            let row = rows.iter().find(|r| r.creative.external_id == id).unwrap();
            assert_eq!(row.creative.status, CreativeStatus::Inactive);
        }
        let five = rows.iter().find(|r| r.creative.external_id == "5").unwrap();
        assert_eq!(five.creative.status, CreativeStatus::Active);
    }

    #[tokio::test]
    async fn dispatches_inserted_and_deactivated_ids() {
        let store = LocalStore::in_memory();
        let source = source_config();
        seed(&store, &source, &[1]).await;

        let fetcher = PagedSource::new(vec![Ok(vec![item(2)]), Ok(Vec::new())]);
        let events = RecordingEvents::default();
        let pipeline =
            SnapshotPipeline::new(&fetcher, &store, &store, &source, &events, params());

        pipeline.run(&CancelToken::new()).await.unwrap();

        let inserted = events.inserted.lock().unwrap();
        let deactivated = events.deactivated.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].len(), 1);
        assert_eq!(deactivated.len(), 1);
        assert_eq!(deactivated[0].len(), 1);
    }

    #[tokio::test]
    async fn partial_crawl_never_deactivates() {
        let store = LocalStore::in_memory();
        let source = source_config();
        seed(&store, &source, &[1, 2]).await;

        // Page 2 fails: crawl is partial, ids {1,2} must stay active.
        let fetcher = PagedSource::new(vec![
            Ok(vec![item(3)]),
            Err(AppError::fetch("http://x", "boom")),
        ]);
        let events = RecordingEvents::default();
        let pipeline =
            SnapshotPipeline::new(&fetcher, &store, &store, &source, &events, params());

        let result = pipeline.run(&CancelToken::new()).await.unwrap();

        assert_eq!(result.stats.new_count, 1);
        assert_eq!(result.stats.deactivated_count, 0);
        let rows = store.rows_for_source("srcB");
        assert!(
            rows.iter()
                .filter(|r| r.creative.external_id != "3")
                .all(|r| r.creative.status == CreativeStatus::Active)
        );
    }

    #[tokio::test]
    async fn first_page_failure_marks_source_failed() {
        let store = LocalStore::in_memory();
        let source = source_config();
        let fetcher = PagedSource::new(vec![Err(AppError::fetch("http://x", "boom"))]);
        let events = RecordingEvents::default();
        let pipeline =
            SnapshotPipeline::new(&fetcher, &store, &store, &source, &events, params());

        assert!(pipeline.run(&CancelToken::new()).await.is_err());

        let state = SourceStateStore::load(&store, "srcB").await.unwrap().unwrap();
        assert_eq!(state.status, SourceStatus::Failed);
    }

    #[tokio::test]
    async fn crawl_walks_pages_in_order() {
        let store = LocalStore::in_memory();
        let source = source_config();
        let fetcher = PagedSource::new(vec![
            Ok(vec![item(1)]),
            Ok(vec![item(2)]),
            Ok(Vec::new()),
        ]);
        let events = RecordingEvents::default();
        let pipeline =
            SnapshotPipeline::new(&fetcher, &store, &store, &source, &events, params());

        let result = pipeline.run(&CancelToken::new()).await.unwrap();

        assert_eq!(*fetcher.calls.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(result.stats.batches_processed, 2);
        assert_eq!(result.stats.processed, 2);
    }

    #[tokio::test]
    async fn dry_run_reports_counts_without_writing() {
        let store = LocalStore::in_memory();
        let source = source_config();
        seed(&store, &source, &[1, 2]).await;

        let fetcher = PagedSource::new(vec![Ok(vec![item(2), item(3)]), Ok(Vec::new())]);
        let events = RecordingEvents::default();
        let mut p = params();
        p.dry_run = true;
        let pipeline = SnapshotPipeline::new(&fetcher, &store, &store, &source, &events, p);

        let result = pipeline.dry_run(&CancelToken::new()).await.unwrap();

        assert!(result.dry_run);
        assert_eq!(result.stats.new_count, 1);
        assert_eq!(result.stats.deactivated_count, 1);
        assert_eq!(result.stats.unchanged_count, 1);

        // Nothing written, nothing dispatched, store untouched.
        assert_eq!(store.count_for_source("srcB").await.unwrap(), 2);
        assert!(events.inserted.lock().unwrap().is_empty());
        let rows = store.rows_for_source("srcB");
        assert!(rows.iter().all(|r| r.creative.status == CreativeStatus::Active));
    }

    #[tokio::test]
    async fn page_cap_counts_as_partial() {
        let store = LocalStore::in_memory();
        let source = source_config();
        seed(&store, &source, &[9]).await;

        let fetcher = PagedSource::new(vec![Ok(vec![item(1)]), Ok(vec![item(2)])]);
        let events = RecordingEvents::default();
        let mut p = params();
        p.max_pages = 2;
        let pipeline = SnapshotPipeline::new(&fetcher, &store, &store, &source, &events, p);

        let result = pipeline.run(&CancelToken::new()).await.unwrap();

        // Both pages were full when the cap hit, so id 9 is spared.
        assert_eq!(result.stats.deactivated_count, 0);
        assert_eq!(result.stats.new_count, 2);
    }

    #[tokio::test]
    async fn duplicate_ids_in_crawl_insert_once() {
        let store = LocalStore::in_memory();
        let source = source_config();

        let fetcher = PagedSource::new(vec![
            Ok(vec![item(1), item(1)]),
            Ok(vec![item(1)]),
            Ok(Vec::new()),
        ]);
        let events = RecordingEvents::default();
        let pipeline =
            SnapshotPipeline::new(&fetcher, &store, &store, &source, &events, params());

        let result = pipeline.run(&CancelToken::new()).await.unwrap();

        assert_eq!(result.stats.new_count, 1);
        assert_eq!(store.count_for_source("srcB").await.unwrap(), 1);
    }
}
