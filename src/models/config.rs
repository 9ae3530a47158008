// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::source::SourceKind;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP fetch behavior settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Run loop and persistence settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// External source definitions
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::validation("fetch.timeout_secs must be > 0"));
        }
        if self.sync.batch_size == 0 {
            return Err(AppError::validation("sync.batch_size must be > 0"));
        }
        if self.sync.chunk_size == 0 {
            return Err(AppError::validation("sync.chunk_size must be > 0"));
        }
        if self.sync.max_pages == 0 {
            return Err(AppError::validation("sync.max_pages must be > 0"));
        }
        if self.sources.is_empty() {
            return Err(AppError::validation("No sources defined"));
        }
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(AppError::validation("source.id is empty"));
            }
            url::Url::parse(&source.base_url)
                .map_err(|e| AppError::validation(format!("source {}: bad base_url: {e}", source.id)))?;
        }
        Ok(())
    }

    /// Look up a source definition by id.
    pub fn source(&self, id: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::UnknownSource(id.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            sync: SyncConfig::default(),
            sources: defaults::default_sources(),
        }
    }
}

/// HTTP client behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Retries after the initial attempt for transient failures
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Backoff base: attempt N waits N * this many seconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_secs: u64,

    /// Upper bound honored for a Retry-After header, in seconds
    #[serde(default = "defaults::max_retry_after")]
    pub max_retry_after_secs: u64,

    /// 429 responses tolerated per request before giving up
    #[serde(default = "defaults::max_rate_limit_hits")]
    pub max_rate_limit_hits: u32,

    /// Delay between successive page fetches in milliseconds
    #[serde(default = "defaults::page_delay")]
    pub page_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            retry_delay_secs: defaults::retry_delay(),
            max_retry_after_secs: defaults::max_retry_after(),
            max_rate_limit_hits: defaults::max_rate_limit_hits(),
            page_delay_ms: defaults::page_delay(),
        }
    }
}

/// Run loop and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Cap on raw items processed per run (cursor sources)
    #[serde(default = "defaults::max_items_per_run")]
    pub max_items_per_run: usize,

    /// Page size requested from the API
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Rows per bulk insert/update statement
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,

    /// Page cap for snapshot crawls, guards against pagination loops
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    /// Minutes after which a Running status counts as a crashed run
    #[serde(default = "defaults::stale_run_minutes")]
    pub stale_run_minutes: i64,

    /// Days of inactivity before retention cleanup removes a creative
    #[serde(default = "defaults::cleanup_days")]
    pub cleanup_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_items_per_run: defaults::max_items_per_run(),
            batch_size: defaults::batch_size(),
            chunk_size: defaults::chunk_size(),
            max_pages: defaults::max_pages(),
            stale_run_minutes: defaults::stale_run_minutes(),
            cleanup_days: defaults::cleanup_days(),
        }
    }
}

/// One external ad-network source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier, also the `source_id` on persisted creatives
    pub id: String,

    /// Human-readable name
    pub display_name: String,

    /// Pagination style of this source's API
    pub kind: SourceKind,

    /// API base URL
    pub base_url: String,

    /// Bearer token, when the API requires one
    #[serde(default)]
    pub api_key: Option<String>,

    /// Format filter sent to cursor APIs (comma-joined)
    #[serde(default = "defaults::formats")]
    pub formats: Vec<String>,

    /// Network filter sent to cursor APIs (comma-joined)
    #[serde(default = "defaults::networks")]
    pub networks: Vec<String>,

    /// Status path segment for snapshot APIs
    #[serde(default = "defaults::status_filter")]
    pub status_filter: String,

    /// Response field names for this source
    #[serde(default)]
    pub fields: FieldMap,
}

/// Maps the normalizer onto a source's JSON field names. The upstream
/// schemas differ per source, so none of these are hardcoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMap {
    #[serde(default = "defaults::f_id")]
    pub id: String,
    #[serde(default = "defaults::f_title")]
    pub title: String,
    #[serde(default = "defaults::f_text")]
    pub text: String,
    #[serde(default = "defaults::f_icon")]
    pub icon: String,
    #[serde(default = "defaults::f_image")]
    pub image: String,
    #[serde(default = "defaults::f_url")]
    pub url: String,
    #[serde(default = "defaults::f_country")]
    pub country: String,
    #[serde(default = "defaults::f_network")]
    pub network: String,
    #[serde(default = "defaults::f_format")]
    pub format: String,
    #[serde(default = "defaults::f_status")]
    pub status: String,
    #[serde(default = "defaults::f_created_at")]
    pub created_at: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            id: defaults::f_id(),
            title: defaults::f_title(),
            text: defaults::f_text(),
            icon: defaults::f_icon(),
            image: defaults::f_image(),
            url: defaults::f_url(),
            country: defaults::f_country(),
            network: defaults::f_network(),
            format: defaults::f_format(),
            status: defaults::f_status(),
            created_at: defaults::f_created_at(),
        }
    }
}

mod defaults {
    use super::{FieldMap, SourceConfig};
    use crate::models::source::SourceKind;

    // Fetch defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; adsync/1.0)".into()
    }
    pub fn timeout() -> u64 {
        45
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        2
    }
    pub fn max_retry_after() -> u64 {
        60
    }
    pub fn max_rate_limit_hits() -> u32 {
        5
    }
    pub fn page_delay() -> u64 {
        500
    }

    // Sync defaults
    pub fn max_items_per_run() -> usize {
        1000
    }
    pub fn batch_size() -> usize {
        200
    }
    pub fn chunk_size() -> usize {
        100
    }
    pub fn max_pages() -> u32 {
        100
    }
    pub fn stale_run_minutes() -> i64 {
        10
    }
    pub fn cleanup_days() -> i64 {
        30
    }

    // Source defaults
    pub fn formats() -> Vec<String> {
        vec!["push".into(), "inpage".into()]
    }
    pub fn networks() -> Vec<String> {
        vec!["rollerads".into(), "richads".into()]
    }
    pub fn status_filter() -> String {
        "active".into()
    }

    pub fn default_sources() -> Vec<SourceConfig> {
        vec![
            SourceConfig {
                id: "feed_house".to_string(),
                display_name: "FeedHouse".to_string(),
                kind: SourceKind::Cursor,
                base_url: "https://api.feed.house/internal/v1/feed-campaigns".to_string(),
                api_key: None,
                formats: formats(),
                networks: networks(),
                status_filter: status_filter(),
                fields: FieldMap {
                    image: "image".into(),
                    country: "countryIso".into(),
                    created_at: "createdAt".into(),
                    ..FieldMap::default()
                },
            },
            SourceConfig {
                id: "push_house".to_string(),
                display_name: "Push.House".to_string(),
                kind: SourceKind::Snapshot,
                base_url: "https://api.push.house/v1".to_string(),
                api_key: None,
                formats: formats(),
                networks: Vec::new(),
                status_filter: status_filter(),
                fields: FieldMap {
                    image: "img".into(),
                    ..FieldMap::default()
                },
            },
        ]
    }

    // Field map defaults
    pub fn f_id() -> String {
        "id".into()
    }
    pub fn f_title() -> String {
        "title".into()
    }
    pub fn f_text() -> String {
        "text".into()
    }
    pub fn f_icon() -> String {
        "icon".into()
    }
    pub fn f_image() -> String {
        "image".into()
    }
    pub fn f_url() -> String {
        "url".into()
    }
    pub fn f_country() -> String {
        "country".into()
    }
    pub fn f_network() -> String {
        "adNetwork".into()
    }
    pub fn f_format() -> String {
        "format".into()
    }
    pub fn f_status() -> String {
        "status".into()
    }
    pub fn f_created_at() -> String {
        "created_at".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.fetch.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.sources[0].base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn source_lookup() {
        let config = Config::default();
        assert!(config.source("feed_house").is_ok());
        assert!(matches!(
            config.source("nope"),
            Err(crate::error::AppError::UnknownSource(_))
        ));
    }

    #[test]
    fn field_map_overrides_parse_from_toml() {
        let toml = r#"
            [[sources]]
            id = "alpha"
            display_name = "Alpha"
            kind = "cursor"
            base_url = "https://example.com/api"

            [sources.fields]
            country = "countryIso"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let source = config.source("alpha").unwrap();
        assert_eq!(source.fields.country, "countryIso");
        assert_eq!(source.fields.id, "id");
    }
}
