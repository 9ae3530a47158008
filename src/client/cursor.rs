// src/client/cursor.rs

//! Cursor-mode API client.
//!
//! The upstream exposes one flat endpoint taking `limit`, an optional
//! `lastId` resume cursor and comma-joined format/network filters. An empty
//! array response signals end-of-data.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FetchConfig, RawCreative, SourceConfig};

use super::{RetryPolicy, create_client, get_json, parse_page};

/// A paginated source addressed by resume cursor.
#[async_trait]
pub trait CursorSource: Send + Sync {
    /// Fetch one page of raw records starting after `cursor`.
    async fn fetch_page(&self, cursor: Option<u64>, limit: usize) -> Result<Vec<RawCreative>>;
}

/// HTTP implementation of [`CursorSource`].
pub struct CursorApiClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    base_url: url::Url,
    api_key: Option<String>,
    formats: String,
    networks: String,
}

impl CursorApiClient {
    /// Build a client for one cursor-mode source.
    pub fn new(source: &SourceConfig, fetch: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(fetch)?,
            policy: RetryPolicy::from_config(fetch),
            base_url: url::Url::parse(&source.base_url)?,
            api_key: source.api_key.clone(),
            formats: source.formats.join(","),
            networks: source.networks.join(","),
        })
    }

    /// Build the page URL for the given cursor and limit.
    fn page_url(&self, cursor: Option<u64>, limit: usize) -> url::Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if !self.formats.is_empty() {
                query.append_pair("formats", &self.formats);
            }
            if !self.networks.is_empty() {
                query.append_pair("adNetworks", &self.networks);
            }
            if let Some(last_id) = cursor {
                query.append_pair("lastId", &last_id.to_string());
            }
        }
        url
    }

    /// Fetch a tiny page to verify the API is reachable.
    pub async fn test_connection(&self) -> Result<usize> {
        let page = self.fetch_page(None, 5).await?;
        Ok(page.len())
    }
}

#[async_trait]
impl CursorSource for CursorApiClient {
    async fn fetch_page(&self, cursor: Option<u64>, limit: usize) -> Result<Vec<RawCreative>> {
        let url = self.page_url(cursor, limit);
        log::debug!("Fetching cursor page: {url}");
        let body = get_json(&self.client, url.as_str(), self.api_key.as_deref(), &self.policy).await?;
        Ok(parse_page(body, url.as_str()))
    }
}
