// src/models/creative.rs

//! Creative data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw item from an API page. Field names vary per source and are
/// resolved through the source's `FieldMap`; never persisted as-is.
pub type RawCreative = serde_json::Value;

/// Advertising format of a creative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreativeFormat {
    #[default]
    Push,
    Inpage,
}

impl CreativeFormat {
    /// Fold a source-reported format string onto the supported set.
    /// `native` and `banner` render in-page; anything unknown is push.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "inpage" | "native" | "banner" => Self::Inpage,
            _ => Self::Push,
        }
    }
}

/// Lifecycle status of a persisted creative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreativeStatus {
    #[default]
    Active,
    Inactive,
}

/// Validated creative ready for persistence.
///
/// `content_hash` is a pure function of `(external_id, source, title, body,
/// country, network)` — two fetches of unchanged content hash identically.
/// Uniqueness in the store is on `(source_id, external_id)`, with the hash
/// as the dedup key for cursor sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedCreative {
    /// Source-scoped external identifier
    pub external_id: String,

    /// Stable SHA-256 over the canonical content fields
    pub content_hash: String,

    /// Creative headline
    pub title: String,

    /// Creative body text
    pub body: String,

    /// Upper-cased ISO country code (empty when the source omits it)
    pub country_code: String,

    /// Ad-network tag the creative was served through
    pub network_tag: String,

    /// Advertising format
    pub format: CreativeFormat,

    /// Active/inactive status as reported by the source
    pub status: CreativeStatus,

    /// Owning source id
    pub source_id: String,

    /// Icon image URL, when the source provides one
    #[serde(default)]
    pub icon_url: Option<String>,

    /// Main image URL, when the source provides one
    #[serde(default)]
    pub image_url: Option<String>,

    /// Landing page URL
    #[serde(default)]
    pub target_url: Option<String>,

    /// Creation time reported by the source, if any
    #[serde(default)]
    pub external_created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_folds_aliases() {
        assert_eq!(CreativeFormat::from_tag("push"), CreativeFormat::Push);
        assert_eq!(CreativeFormat::from_tag("inpage"), CreativeFormat::Inpage);
        assert_eq!(CreativeFormat::from_tag("native"), CreativeFormat::Inpage);
        assert_eq!(CreativeFormat::from_tag("banner"), CreativeFormat::Inpage);
        assert_eq!(CreativeFormat::from_tag("POP"), CreativeFormat::Push);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&CreativeStatus::Inactive).unwrap();
        assert_eq!(json, "\"inactive\"");
    }
}
