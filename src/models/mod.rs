// src/models/mod.rs

//! Domain models for the synchronization core.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod creative;
mod run;
mod source;

// Re-export all public types
pub use config::{Config, FetchConfig, FieldMap, SourceConfig, SyncConfig};
pub use creative::{CreativeFormat, CreativeStatus, NormalizedCreative, RawCreative};
pub use run::{RunResult, RunStats, StopReason, SyncOptions};
pub use source::{SourceError, SourceKind, SourceState, SourceStatus};
