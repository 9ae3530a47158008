// src/pipeline/mod.rs

//! Synchronization pipelines.
//!
//! - `cursor`: incremental one-shot runs over a resume cursor, deduplicated
//!   by content hash
//! - `snapshot`: full-crawl runs reconciled by set difference
//! - shared pieces: dedup index, reconciler, batch persistence, run tracker

pub mod cursor;
pub mod dedup;
pub mod persist;
pub mod reconcile;
pub mod snapshot;
pub mod tracker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub use cursor::CursorPipeline;
pub use dedup::DedupIndex;
pub use persist::{PersistOutcome, apply_reconciliation};
pub use reconcile::{Reconciliation, reconcile};
pub use snapshot::{SnapshotCrawl, SnapshotPipeline};
pub use tracker::RunTracker;

use crate::models::{Config, SyncOptions};

/// External cancellation signal for a running sync.
///
/// Cancellation stops the run from issuing new page fetches; the in-flight
/// chunk write finishes before the run returns `Cancelled`, so no
/// half-applied chunk is left behind.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, un-triggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Effective knobs for one run, resolved from config plus per-call options.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Cap on raw items processed in one run
    pub max_items_per_run: usize,
    /// Page size requested from the API
    pub batch_size: usize,
    /// Rows per bulk statement
    pub chunk_size: usize,
    /// Page cap for snapshot crawls
    pub max_pages: u32,
    /// First page for snapshot crawls (1-based)
    pub start_page: u32,
    /// Delay between successive page fetches
    pub page_delay: Duration,
    /// Minutes before a Running status counts as crashed
    pub stale_run_minutes: i64,
    /// Compute counts without writing or touching run state
    pub dry_run: bool,
}

impl RunParams {
    /// Resolve parameters from configuration and per-call options.
    pub fn resolve(config: &Config, options: &SyncOptions) -> Self {
        Self {
            max_items_per_run: options
                .max_items_per_run
                .unwrap_or(config.sync.max_items_per_run),
            batch_size: options.batch_size.unwrap_or(config.sync.batch_size),
            chunk_size: config.sync.chunk_size,
            max_pages: config.sync.max_pages,
            start_page: options.start_page.unwrap_or(1),
            page_delay: Duration::from_millis(config.fetch.page_delay_ms),
            stale_run_minutes: config.sync.stale_run_minutes,
            dry_run: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());

        let shared = token.clone();
        assert!(shared.is_cancelled());
    }

    #[test]
    fn run_params_prefer_options_over_config() {
        let config = Config::default();
        let options = SyncOptions {
            max_items_per_run: Some(250),
            batch_size: Some(200),
            start_page: Some(3),
            ..SyncOptions::default()
        };
        let params = RunParams::resolve(&config, &options);
        assert_eq!(params.max_items_per_run, 250);
        assert_eq!(params.batch_size, 200);
        assert_eq!(params.start_page, 3);
        assert_eq!(params.chunk_size, config.sync.chunk_size);
    }
}
