// src/models/run.rs

//! Run outcome value objects.

use serde::{Deserialize, Serialize};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The per-run item cap was reached
    ReachedLimit,
    /// The upstream returned an empty or short page
    ReachedEnd,
    /// An unrecoverable error ended the run
    Failed,
    /// An external cancellation signal stopped the run
    Cancelled,
}

/// Counters accumulated over one run. Also embedded into the source's
/// error diagnostics when a run fails mid-way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Raw items received from the API (including invalid ones)
    pub processed: usize,
    /// Records written to the store
    pub saved: usize,
    /// Records skipped because their content hash already existed
    pub duplicates_skipped: usize,
    /// Records dropped by validation or page-level fetch failures
    pub errors: usize,
    /// Non-empty pages handled
    pub batches_processed: usize,
    /// Records newly inserted by snapshot reconciliation
    pub new_count: usize,
    /// Records flipped to inactive by snapshot reconciliation
    pub deactivated_count: usize,
    /// Records present in both the store and the latest snapshot
    pub unchanged_count: usize,
}

impl RunStats {
    /// Merge the counters of one processed page into the run totals.
    pub fn absorb(&mut self, other: &RunStats) {
        self.processed += other.processed;
        self.saved += other.saved;
        self.duplicates_skipped += other.duplicates_skipped;
        self.errors += other.errors;
        self.batches_processed += other.batches_processed;
        self.new_count += other.new_count;
        self.deactivated_count += other.deactivated_count;
        self.unchanged_count += other.unchanged_count;
    }
}

/// Summary of one completed (or truncated) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Source that was synchronized
    pub source_id: String,
    /// Accumulated counters
    pub stats: RunStats,
    /// Wall-clock duration, rounded to centiseconds
    pub duration_seconds: f64,
    /// Cursor after the last fully processed page (cursor sources)
    pub final_cursor: Option<u64>,
    /// Why the run stopped
    pub reason: StopReason,
    /// Whether this was a dry run (no writes performed)
    #[serde(default)]
    pub dry_run: bool,
}

/// Per-invocation knobs; unset fields fall back to `SyncConfig`.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Cap on raw items processed in one run
    pub max_items_per_run: Option<usize>,
    /// Page size requested from the API
    pub batch_size: Option<usize>,
    /// Status filter for snapshot sources (e.g. "active")
    pub status: Option<String>,
    /// First page to request for snapshot sources (1-based)
    pub start_page: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_sums_all_counters() {
        let mut total = RunStats::default();
        let page = RunStats {
            processed: 10,
            saved: 7,
            duplicates_skipped: 2,
            errors: 1,
            batches_processed: 1,
            ..RunStats::default()
        };
        total.absorb(&page);
        total.absorb(&page);
        assert_eq!(total.processed, 20);
        assert_eq!(total.saved, 14);
        assert_eq!(total.duplicates_skipped, 4);
        assert_eq!(total.errors, 2);
        assert_eq!(total.batches_processed, 2);
    }

    #[test]
    fn stop_reason_serializes_snake_case() {
        let json = serde_json::to_string(&StopReason::ReachedLimit).unwrap();
        assert_eq!(json, "\"reached_limit\"");
    }
}
