// src/pipeline/cursor.rs

//! One-shot cursor synchronization.
//!
//! Processes at most `max_items_per_run` raw items per invocation, resuming
//! from the source's persisted cursor. Each page is normalized, deduplicated
//! by content hash and persisted in one transaction, then the cursor is
//! checkpointed — a crash loses at most one page of progress.

use std::time::Instant;

use crate::client::CursorSource;
use crate::error::Result;
use crate::models::{RawCreative, RunResult, RunStats, SourceConfig, SourceState, StopReason};
use crate::normalize::Normalizer;
use crate::storage::{CreativeStore, SourceStateStore};

use super::dedup::DedupIndex;
use super::persist::insert_chunked;
use super::tracker::RunTracker;
use super::{CancelToken, RunParams};

/// Cursor-mode pipeline for one source.
pub struct CursorPipeline<'a> {
    fetcher: &'a dyn CursorSource,
    store: &'a dyn CreativeStore,
    tracker: RunTracker<'a>,
    normalizer: Normalizer,
    source: &'a SourceConfig,
    params: RunParams,
}

impl<'a> CursorPipeline<'a> {
    /// Wire up a pipeline from its collaborators.
    pub fn new(
        fetcher: &'a dyn CursorSource,
        store: &'a dyn CreativeStore,
        states: &'a dyn SourceStateStore,
        source: &'a SourceConfig,
        params: RunParams,
    ) -> Self {
        Self {
            fetcher,
            store,
            tracker: RunTracker::new(states, params.stale_run_minutes),
            normalizer: Normalizer::new(&source.id, source.fields.clone()),
            source,
            params,
        }
    }

    /// Execute one bounded run, updating run state throughout.
    pub async fn run(&self, cancel: &CancelToken) -> Result<RunResult> {
        let started = Instant::now();
        let mut state = self.tracker.begin(self.source).await?;
        let mut stats = RunStats::default();

        match self.run_inner(&mut state, &mut stats, cancel).await {
            Ok(reason) => {
                self.tracker.complete(&mut state).await?;
                let result = self.build_result(&state, stats, started, reason, false);
                log::info!(
                    "Source {}: {} processed, {} saved, {} duplicates, {} errors in {:.2}s ({:?})",
                    self.source.id,
                    result.stats.processed,
                    result.stats.saved,
                    result.stats.duplicates_skipped,
                    result.stats.errors,
                    result.duration_seconds,
                    result.reason
                );
                Ok(result)
            }
            Err(e) => {
                self.tracker
                    .fail(&mut state, "cursor_run", &e.to_string(), stats)
                    .await?;
                Err(e)
            }
        }
    }

    /// Compute would-be counts without writing or touching run state.
    /// Requires `params.dry_run`.
    pub async fn dry_run(&self, cancel: &CancelToken) -> Result<RunResult> {
        let started = Instant::now();
        let mut state = self.tracker.peek(self.source).await?;
        let mut stats = RunStats::default();
        let reason = self.run_inner(&mut state, &mut stats, cancel).await?;
        Ok(self.build_result(&state, stats, started, reason, true))
    }

    async fn run_inner(
        &self,
        state: &mut SourceState,
        stats: &mut RunStats,
        cancel: &CancelToken,
    ) -> Result<StopReason> {
        let max_items = self.params.max_items_per_run;
        let mut dedup = DedupIndex::new(self.store);
        let mut total = 0usize;

        while total < max_items {
            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }

            let want = self.params.batch_size.min(max_items - total);
            let page = match self.fetcher.fetch_page(state.cursor, want).await {
                Ok(page) => page,
                Err(e) if total == 0 => return Err(e),
                Err(e) => {
                    // Later pages fail soft: what was already persisted and
                    // checkpointed stays.
                    stats.errors += 1;
                    log::warn!(
                        "Source {}: page fetch failed mid-run, keeping partial progress: {e}",
                        self.source.id
                    );
                    return Ok(StopReason::ReachedEnd);
                }
            };

            if page.is_empty() {
                log::info!("Source {}: no more data available", self.source.id);
                return Ok(StopReason::ReachedEnd);
            }

            stats.batches_processed += 1;
            let received = page.len();

            self.process_page(&page, &mut dedup, stats).await?;

            total += received;
            stats.processed += received;

            // The cursor advances over raw ids so invalid records are never
            // refetched either.
            if let Some(max_id) = page.iter().filter_map(|r| self.normalizer.raw_id(r)).max() {
                if self.params.dry_run {
                    state.cursor = Some(max_id);
                } else {
                    self.tracker.checkpoint(state, max_id).await?;
                }
            }

            log::info!(
                "Source {}: batch {} done ({received} items, {total}/{max_items}, cursor {:?})",
                self.source.id,
                stats.batches_processed,
                state.cursor
            );

            if total >= max_items {
                return Ok(StopReason::ReachedLimit);
            }
            if received < want {
                log::info!(
                    "Source {}: short page ({received} < {want}), upstream exhausted",
                    self.source.id
                );
                return Ok(StopReason::ReachedEnd);
            }
            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }

            tokio::time::sleep(self.params.page_delay).await;
        }

        Ok(StopReason::ReachedLimit)
    }

    async fn process_page(
        &self,
        page: &[RawCreative],
        dedup: &mut DedupIndex<'_>,
        stats: &mut RunStats,
    ) -> Result<()> {
        let mut fresh = Vec::new();

        for raw in page {
            let record = match self.normalizer.normalize(raw) {
                Ok(record) => record,
                Err(e) => {
                    stats.errors += 1;
                    log::debug!("Source {}: record skipped: {e}", self.source.id);
                    continue;
                }
            };

            if dedup.is_duplicate(&record).await? {
                stats.duplicates_skipped += 1;
                continue;
            }

            fresh.push(record);
        }

        if self.params.dry_run {
            stats.saved += fresh.len();
            return Ok(());
        }

        stats.saved += insert_chunked(self.store, &fresh, self.params.chunk_size).await?;
        Ok(())
    }

    fn build_result(
        &self,
        state: &SourceState,
        stats: RunStats,
        started: Instant,
        reason: StopReason,
        dry_run: bool,
    ) -> RunResult {
        RunResult {
            source_id: self.source.id.clone(),
            stats,
            duration_seconds: (started.elapsed().as_secs_f64() * 100.0).round() / 100.0,
            final_cursor: state.cursor,
            reason,
            dry_run,
        }
    }
}
