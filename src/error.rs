// src/error.rs

//! Unified error handling for the synchronization core.

use std::fmt;

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Fetch failed after the retry budget was exhausted
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// 404 from the upstream API; usually the end of path-based pagination
    #[error("Page not found (end of pagination?): {url}")]
    PageNotFound { url: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store write/transaction failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A caller-side invariant was violated (e.g. reconciling a partial crawl)
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A run is already in progress for this source
    #[error("Source {source_id} is already running a sync")]
    SourceBusy { source_id: String },

    /// Source id not present in configuration
    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

impl AppError {
    /// Create a fetch error with the requested URL as context.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}
