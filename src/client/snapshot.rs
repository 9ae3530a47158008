// src/client/snapshot.rs

//! Path-page-mode API client.
//!
//! The upstream embeds a 1-based page number and a status filter in the
//! request path (`/ads/{page}/{status}`). An empty array — or a 404 — marks
//! the end of pagination.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FetchConfig, RawCreative, SourceConfig};

use super::{RetryPolicy, create_client, get_json, parse_page};

/// A source whose every crawl walks the full active set page by page.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch one page of raw records (1-based page number).
    async fn fetch_page(&self, page: u32) -> Result<Vec<RawCreative>>;
}

/// HTTP implementation of [`SnapshotSource`].
pub struct SnapshotApiClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    base_url: String,
    api_key: Option<String>,
    status_filter: String,
}

impl SnapshotApiClient {
    /// Build a client for one snapshot-mode source.
    pub fn new(source: &SourceConfig, fetch: &FetchConfig) -> Result<Self> {
        // Validate early so a bad URL fails at construction, not mid-crawl.
        url::Url::parse(&source.base_url)?;
        Ok(Self {
            client: create_client(fetch)?,
            policy: RetryPolicy::from_config(fetch),
            base_url: source.base_url.trim_end_matches('/').to_string(),
            api_key: source.api_key.clone(),
            status_filter: source.status_filter.clone(),
        })
    }

    fn page_url(&self, page: u32) -> String {
        format!("{}/ads/{}/{}", self.base_url, page, self.status_filter)
    }

    /// Fetch the first page to verify the API is reachable.
    pub async fn test_connection(&self) -> Result<usize> {
        let page = self.fetch_page(1).await?;
        Ok(page.len())
    }
}

#[async_trait]
impl SnapshotSource for SnapshotApiClient {
    async fn fetch_page(&self, page: u32) -> Result<Vec<RawCreative>> {
        let url = self.page_url(page);
        log::debug!("Fetching snapshot page: {url}");
        let body = get_json(&self.client, &url, self.api_key.as_deref(), &self.policy).await?;
        Ok(parse_page(body, &url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldMap, SourceKind};

    fn source() -> SourceConfig {
        SourceConfig {
            id: "srcB".into(),
            display_name: "Source B".into(),
            kind: SourceKind::Snapshot,
            base_url: "https://api.example.com/v1/".into(),
            api_key: None,
            formats: Vec::new(),
            networks: Vec::new(),
            status_filter: "active".into(),
            fields: FieldMap::default(),
        }
    }

    #[test]
    fn page_url_embeds_page_and_status() {
        let client = SnapshotApiClient::new(&source(), &FetchConfig::default()).unwrap();
        assert_eq!(client.page_url(1), "https://api.example.com/v1/ads/1/active");
        assert_eq!(client.page_url(37), "https://api.example.com/v1/ads/37/active");
    }

    #[test]
    fn status_filter_is_configurable() {
        let mut cfg = source();
        cfg.status_filter = "all".into();
        let client = SnapshotApiClient::new(&cfg, &FetchConfig::default()).unwrap();
        assert_eq!(client.page_url(2), "https://api.example.com/v1/ads/2/all");
    }

    #[test]
    fn bad_base_url_fails_at_construction() {
        let mut cfg = source();
        cfg.base_url = "not a url".into();
        assert!(SnapshotApiClient::new(&cfg, &FetchConfig::default()).is_err());
    }
}
