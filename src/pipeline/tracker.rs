// src/pipeline/tracker.rs

//! Run-state tracking.
//!
//! Makes each run resumable and observable, and serializes runs per source:
//!
//! ```text
//! idle --(begin)--> running --(complete)--> idle
//! running --(fail)--> failed --(begin)--> running
//! ```
//!
//! A `Running` status rejects a second `begin` unless the state is stale
//! enough to count as a crashed run, in which case the new run takes over.

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{RunStats, SourceConfig, SourceError, SourceState, SourceStatus};
use crate::storage::SourceStateStore;

/// Tracker bound to a source-state store.
pub struct RunTracker<'a> {
    states: &'a dyn SourceStateStore,
    stale_run_minutes: i64,
}

impl<'a> RunTracker<'a> {
    /// Create a tracker.
    pub fn new(states: &'a dyn SourceStateStore, stale_run_minutes: i64) -> Self {
        Self {
            states,
            stale_run_minutes,
        }
    }

    /// Start a run: load (or register) the source state, reject overlapping
    /// runs, clear prior error fields and persist `Running`.
    pub async fn begin(&self, source: &SourceConfig) -> Result<SourceState> {
        let mut state = match self.states.load(&source.id).await? {
            Some(state) => state,
            None => SourceState::new(&source.id, &source.display_name, source.kind),
        };

        if state.status == SourceStatus::Running {
            if state.is_stale_run(self.stale_run_minutes) {
                log::warn!(
                    "Source {}: resetting stuck Running status (last update {})",
                    source.id,
                    state.updated_at
                );
            } else {
                return Err(AppError::SourceBusy {
                    source_id: source.id.clone(),
                });
            }
        }

        state.status = SourceStatus::Running;
        state.last_error = None;
        self.states.save(&state).await?;

        log::info!("Source {}: run started (cursor {:?})", source.id, state.cursor);
        Ok(state)
    }

    /// Load the current state without mutating it (dry runs, diagnostics).
    pub async fn peek(&self, source: &SourceConfig) -> Result<SourceState> {
        Ok(self
            .states
            .load(&source.id)
            .await?
            .unwrap_or_else(|| SourceState::new(&source.id, &source.display_name, source.kind)))
    }

    /// Persist the cursor after a fully processed page. A crash after this
    /// point loses at most the following page.
    pub async fn checkpoint(&self, state: &mut SourceState, cursor: u64) -> Result<()> {
        state.cursor = Some(cursor);
        self.states.save(state).await?;
        log::debug!("Source {}: checkpoint at {}", state.source_id, cursor);
        Ok(())
    }

    /// Finish a successful run.
    pub async fn complete(&self, state: &mut SourceState) -> Result<()> {
        state.status = SourceStatus::Idle;
        state.last_run_at = Some(Utc::now());
        state.last_error = None;
        self.states.save(state).await?;
        log::info!("Source {}: run complete", state.source_id);
        Ok(())
    }

    /// Record a failed run with enough structure to diagnose it without
    /// log-diving. Failures are not terminal; the next `begin` restarts.
    pub async fn fail(
        &self,
        state: &mut SourceState,
        location: &str,
        message: &str,
        stats: RunStats,
    ) -> Result<()> {
        state.status = SourceStatus::Failed;
        state.last_error = Some(SourceError {
            message: message.to_string(),
            location: location.to_string(),
            stats,
            at: Utc::now(),
        });
        self.states.save(state).await?;
        log::error!("Source {}: run failed at {location}: {message}", state.source_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Config;
    use crate::storage::LocalStore;
    use chrono::Duration;

    fn source_config() -> SourceConfig {
        Config::default().sources[0].clone()
    }

    #[tokio::test]
    async fn begin_registers_new_source() {
        let store = LocalStore::in_memory();
        let tracker = RunTracker::new(&store, 10);

        let state = tracker.begin(&source_config()).await.unwrap();
        assert_eq!(state.status, SourceStatus::Running);

        let loaded = store.load(&state.source_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SourceStatus::Running);
    }

    #[tokio::test]
    async fn overlapping_run_is_rejected() {
        let store = LocalStore::in_memory();
        let tracker = RunTracker::new(&store, 10);

        tracker.begin(&source_config()).await.unwrap();
        let err = tracker.begin(&source_config()).await.unwrap_err();
        assert!(matches!(err, AppError::SourceBusy { .. }));
    }

    #[tokio::test]
    async fn stale_running_state_is_taken_over() {
        let store = LocalStore::in_memory();
        let tracker = RunTracker::new(&store, 10);

        let mut state = tracker.begin(&source_config()).await.unwrap();
        // Age the persisted state past the staleness window.
        state.updated_at = Utc::now() - Duration::minutes(30);
        store.insert_state_raw(state);

        let state = tracker.begin(&source_config()).await.unwrap();
        assert_eq!(state.status, SourceStatus::Running);
    }

    #[tokio::test]
    async fn full_cycle_returns_to_idle() {
        let store = LocalStore::in_memory();
        let tracker = RunTracker::new(&store, 10);

        let mut state = tracker.begin(&source_config()).await.unwrap();
        tracker.checkpoint(&mut state, 1500).await.unwrap();
        tracker.complete(&mut state).await.unwrap();

        let loaded = store.load(&state.source_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SourceStatus::Idle);
        assert_eq!(loaded.cursor, Some(1500));
        assert!(loaded.last_run_at.is_some());
        assert!(loaded.last_error.is_none());
    }

    #[tokio::test]
    async fn failure_records_diagnostics_and_allows_restart() {
        let store = LocalStore::in_memory();
        let tracker = RunTracker::new(&store, 10);

        let mut state = tracker.begin(&source_config()).await.unwrap();
        let stats = RunStats {
            processed: 42,
            ..RunStats::default()
        };
        tracker
            .fail(&mut state, "cursor_run", "upstream exploded", stats)
            .await
            .unwrap();

        let loaded = store.load(&state.source_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SourceStatus::Failed);
        let error = loaded.last_error.unwrap();
        assert_eq!(error.location, "cursor_run");
        assert_eq!(error.stats.processed, 42);

        // Failed is not terminal.
        let state = tracker.begin(&source_config()).await.unwrap();
        assert_eq!(state.status, SourceStatus::Running);
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn begin_keeps_existing_cursor() {
        let store = LocalStore::in_memory();
        let tracker = RunTracker::new(&store, 10);

        let mut state = tracker.begin(&source_config()).await.unwrap();
        tracker.checkpoint(&mut state, 900).await.unwrap();
        tracker.complete(&mut state).await.unwrap();

        let resumed = tracker.begin(&source_config()).await.unwrap();
        assert_eq!(resumed.cursor, Some(900));
    }
}
