// src/service.rs

//! Synchronization service facade.
//!
//! Thin coordinator tying config, clients, pipelines and the store together
//! for a scheduler or CLI: one-shot sync per source, dry runs, connection
//! checks and retention cleanup. Sources are independent and can run
//! concurrently.

use std::sync::Arc;

use futures::future::join_all;

use crate::client::{CursorApiClient, SnapshotApiClient};
use crate::dispatch::CreativeEvents;
use crate::error::Result;
use crate::models::{Config, RunResult, SourceConfig, SourceKind, SyncOptions};
use crate::pipeline::{CancelToken, CursorPipeline, RunParams, SnapshotPipeline};
use crate::storage::{CreativeStore, SourceStateStore};

/// Facade over the two pipelines.
pub struct SyncService {
    config: Config,
    store: Arc<dyn CreativeStore>,
    states: Arc<dyn SourceStateStore>,
    events: Arc<dyn CreativeEvents>,
}

impl SyncService {
    /// Build a service around a store implementing both storage traits.
    pub fn new<S>(config: Config, store: Arc<S>, events: Arc<dyn CreativeEvents>) -> Self
    where
        S: CreativeStore + SourceStateStore + 'static,
    {
        Self {
            config,
            store: store.clone(),
            states: store,
            events,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one synchronization cycle for a source.
    pub async fn parse_and_sync(
        &self,
        source_id: &str,
        options: &SyncOptions,
        cancel: &CancelToken,
    ) -> Result<RunResult> {
        let source = self.resolve_source(source_id, options)?;
        let params = RunParams::resolve(&self.config, options);

        log::info!(
            "Starting sync for {} ({:?}, max {} items)",
            source.id,
            source.kind,
            params.max_items_per_run
        );

        match source.kind {
            SourceKind::Cursor => {
                let client = CursorApiClient::new(&source, &self.config.fetch)?;
                let pipeline = CursorPipeline::new(
                    &client,
                    self.store.as_ref(),
                    self.states.as_ref(),
                    &source,
                    params,
                );
                pipeline.run(cancel).await
            }
            SourceKind::Snapshot => {
                let client = SnapshotApiClient::new(&source, &self.config.fetch)?;
                let pipeline = SnapshotPipeline::new(
                    &client,
                    self.store.as_ref(),
                    self.states.as_ref(),
                    &source,
                    self.events.as_ref(),
                    params,
                );
                pipeline.run(cancel).await
            }
        }
    }

    /// Simulate a run: fetch and classify, but write nothing.
    pub async fn dry_run(
        &self,
        source_id: &str,
        options: &SyncOptions,
        cancel: &CancelToken,
    ) -> Result<RunResult> {
        let source = self.resolve_source(source_id, options)?;
        let mut params = RunParams::resolve(&self.config, options);
        params.dry_run = true;

        match source.kind {
            SourceKind::Cursor => {
                let client = CursorApiClient::new(&source, &self.config.fetch)?;
                let pipeline = CursorPipeline::new(
                    &client,
                    self.store.as_ref(),
                    self.states.as_ref(),
                    &source,
                    params,
                );
                pipeline.dry_run(cancel).await
            }
            SourceKind::Snapshot => {
                let client = SnapshotApiClient::new(&source, &self.config.fetch)?;
                let pipeline = SnapshotPipeline::new(
                    &client,
                    self.store.as_ref(),
                    self.states.as_ref(),
                    &source,
                    self.events.as_ref(),
                    params,
                );
                pipeline.dry_run(cancel).await
            }
        }
    }

    /// Run every configured source, concurrently and independently.
    /// Returns one result per source in configuration order.
    pub async fn sync_all(
        &self,
        options: &SyncOptions,
        cancel: &CancelToken,
    ) -> Vec<(String, Result<RunResult>)> {
        let runs = self.config.sources.iter().map(|source| {
            let id = source.id.clone();
            async move {
                let outcome = self.parse_and_sync(&id, options, cancel).await;
                if let Err(e) = &outcome {
                    log::error!("Sync failed for {id}: {e}");
                }
                (id, outcome)
            }
        });
        join_all(runs).await
    }

    /// Fetch one small sample page to verify a source's API is reachable.
    /// Returns the sample item count.
    pub async fn test_connection(&self, source_id: &str) -> Result<usize> {
        let source = self.config.source(source_id)?;
        match source.kind {
            SourceKind::Cursor => {
                CursorApiClient::new(source, &self.config.fetch)?
                    .test_connection()
                    .await
            }
            SourceKind::Snapshot => {
                SnapshotApiClient::new(source, &self.config.fetch)?
                    .test_connection()
                    .await
            }
        }
    }

    /// Remove records of a source that have been inactive longer than
    /// `days` (config default when unset). Returns rows removed.
    pub async fn cleanup(&self, source_id: &str, days: Option<i64>) -> Result<usize> {
        let source = self.config.source(source_id)?;
        let days = days.unwrap_or(self.config.sync.cleanup_days);
        let removed = self.store.purge_inactive(&source.id, days).await?;
        log::info!("Cleanup for {}: {removed} records older than {days} days removed", source.id);
        Ok(removed)
    }

    fn resolve_source(&self, source_id: &str, options: &SyncOptions) -> Result<SourceConfig> {
        let mut source = self.config.source(source_id)?.clone();
        if let Some(status) = &options.status {
            source.status_filter = status.clone();
        }
        Ok(source)
    }
}
