// src/models/source.rs

//! Per-source parser state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run::RunStats;

/// Pagination style of an external source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Incremental fetch via a `lastId` resume cursor; dedup by content hash.
    Cursor,
    /// Each run fetches the entire active set; reconcile by set difference.
    Snapshot,
}

/// Run status of a source. `Running` serializes runs: a second invocation
/// while a fresh run holds this status is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    #[default]
    Idle,
    Running,
    Failed,
}

/// Structured diagnostics captured when a run fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceError {
    /// Human-readable error message
    pub message: String,
    /// Where the error originated (component name)
    pub location: String,
    /// Counters accumulated up to the failure
    pub stats: RunStats,
    /// When the failure was recorded
    pub at: DateTime<Utc>,
}

/// Persisted state for one external ad network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceState {
    /// Stable source identifier (matches a `SourceConfig.id`)
    pub source_id: String,

    /// Human-readable name for logs and diagnostics
    pub display_name: String,

    /// Pagination style
    pub kind: SourceKind,

    /// Resume cursor: last seen numeric external id (cursor sources only)
    #[serde(default)]
    pub cursor: Option<u64>,

    /// Current run status
    #[serde(default)]
    pub status: SourceStatus,

    /// Completion time of the last successful run
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,

    /// Diagnostics from the last failed run, cleared on the next start
    #[serde(default)]
    pub last_error: Option<SourceError>,

    /// When this state was last written; used to detect crashed runs
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl SourceState {
    /// Fresh state for a newly registered source.
    pub fn new(source_id: impl Into<String>, display_name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            source_id: source_id.into(),
            display_name: display_name.into(),
            kind,
            cursor: None,
            status: SourceStatus::Idle,
            last_run_at: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether a `Running` status is stale enough to be treated as a crashed
    /// run and taken over.
    pub fn is_stale_run(&self, stale_after_minutes: i64) -> bool {
        self.status == SourceStatus::Running
            && (Utc::now() - self.updated_at).num_minutes() >= stale_after_minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_state_is_idle() {
        let state = SourceState::new("srcA", "Source A", SourceKind::Cursor);
        assert_eq!(state.status, SourceStatus::Idle);
        assert!(state.cursor.is_none());
        assert!(state.last_error.is_none());
    }

    #[test]
    fn recent_running_state_is_not_stale() {
        let mut state = SourceState::new("srcA", "Source A", SourceKind::Cursor);
        state.status = SourceStatus::Running;
        assert!(!state.is_stale_run(10));
    }

    #[test]
    fn old_running_state_is_stale() {
        let mut state = SourceState::new("srcA", "Source A", SourceKind::Cursor);
        state.status = SourceStatus::Running;
        state.updated_at = Utc::now() - Duration::minutes(30);
        assert!(state.is_stale_run(10));
    }

    #[test]
    fn idle_state_is_never_stale() {
        let mut state = SourceState::new("srcA", "Source A", SourceKind::Snapshot);
        state.updated_at = Utc::now() - Duration::minutes(120);
        assert!(!state.is_stale_run(10));
    }
}
