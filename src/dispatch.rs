// src/dispatch.rs

//! Downstream notification hooks.
//!
//! After a snapshot reconciliation commits, the internal ids of inserted and
//! deactivated rows are handed to a [`CreativeEvents`] implementation for
//! async enrichment (image checks, classification, ...). Queueing itself
//! lives outside this crate; the default implementation only logs.

use async_trait::async_trait;

/// Receiver for post-commit creative id batches.
#[async_trait]
pub trait CreativeEvents: Send + Sync {
    /// Called with the internal ids of newly inserted creatives.
    async fn inserted(&self, ids: &[u64]);

    /// Called with the internal ids of newly deactivated creatives.
    async fn deactivated(&self, ids: &[u64]);
}

/// Default sink: log the batches and move on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEvents;

#[async_trait]
impl CreativeEvents for LogEvents {
    async fn inserted(&self, ids: &[u64]) {
        log::info!("Dispatch: {} new creatives ready for enrichment", ids.len());
    }

    async fn deactivated(&self, ids: &[u64]) {
        log::info!("Dispatch: {} creatives deactivated", ids.len());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every batch it receives.
    #[derive(Default)]
    pub struct RecordingEvents {
        pub inserted: Mutex<Vec<Vec<u64>>>,
        pub deactivated: Mutex<Vec<Vec<u64>>>,
    }

    #[async_trait]
    impl CreativeEvents for RecordingEvents {
        async fn inserted(&self, ids: &[u64]) {
            self.inserted.lock().unwrap().push(ids.to_vec());
        }

        async fn deactivated(&self, ids: &[u64]) {
            self.deactivated.lock().unwrap().push(ids.to_vec());
        }
    }
}
