// src/normalize.rs

//! Record normalization.
//!
//! Converts one raw API item into a validated [`NormalizedCreative`] using
//! the source's configured field names, and derives the stable content hash
//! that cursor-style dedup relies on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::{CreativeFormat, CreativeStatus, FieldMap, NormalizedCreative, RawCreative};

/// Canonical subset of fields the content hash is computed over. Field
/// order is fixed by declaration and serde_json leaves multi-byte text
/// unescaped, so the resulting hash is stable across platforms.
#[derive(Serialize)]
struct HashFields<'a> {
    external_id: &'a str,
    source: &'a str,
    title: &'a str,
    text: &'a str,
    country: &'a str,
    #[serde(rename = "adNetwork")]
    network: &'a str,
}

/// Compute the content hash for one creative's canonical fields.
pub fn content_hash(
    external_id: &str,
    source: &str,
    title: &str,
    text: &str,
    country: &str,
    network: &str,
) -> String {
    let fields = HashFields {
        external_id,
        source,
        title,
        text,
        country,
        network,
    };
    // Serializing a struct with only string fields cannot fail.
    let canonical = serde_json::to_vec(&fields).expect("hash fields serialize");
    hex::encode(Sha256::digest(&canonical))
}

/// Normalizer for one source's raw API items.
#[derive(Debug, Clone)]
pub struct Normalizer {
    source_id: String,
    fields: FieldMap,
}

impl Normalizer {
    /// Create a normalizer bound to a source id and its field map.
    pub fn new(source_id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            source_id: source_id.into(),
            fields,
        }
    }

    /// Extract the numeric external id from a raw item, used to advance the
    /// pagination cursor even when the record later fails validation.
    pub fn raw_id(&self, raw: &RawCreative) -> Option<u64> {
        match raw.get(&self.fields.id) {
            Some(v) if v.is_u64() => v.as_u64(),
            Some(v) => v.as_str().and_then(|s| s.parse().ok()),
            None => None,
        }
    }

    /// Convert one raw API item into a validated creative.
    ///
    /// Pure transform: no side effects, no store access. Callers count a
    /// returned `Validation` error and continue with the rest of the page.
    pub fn normalize(&self, raw: &RawCreative) -> Result<NormalizedCreative> {
        let external_id = self
            .raw_id(raw)
            .filter(|id| *id != 0)
            .ok_or_else(|| AppError::validation(format!("missing or zero {} field", self.fields.id)))?
            .to_string();

        let title = self.str_field(raw, &self.fields.title);
        let body = self.str_field(raw, &self.fields.text);
        if title.is_empty() && body.is_empty() {
            return Err(AppError::validation(format!(
                "creative {external_id}: both title and text are empty"
            )));
        }

        let country_code = self.str_field(raw, &self.fields.country).to_uppercase();
        let network_tag = match self.str_field(raw, &self.fields.network) {
            tag if tag.is_empty() => "unknown".to_string(),
            tag => tag,
        };
        let format = CreativeFormat::from_tag(&self.str_field(raw, &self.fields.format));
        let status = self.parse_status(raw);

        let content_hash = content_hash(
            &external_id,
            &self.source_id,
            &title,
            &body,
            &country_code,
            &network_tag,
        );

        Ok(NormalizedCreative {
            external_id,
            content_hash,
            title,
            body,
            country_code,
            network_tag,
            format,
            status,
            source_id: self.source_id.clone(),
            icon_url: self.opt_field(raw, &self.fields.icon),
            image_url: self.opt_field(raw, &self.fields.image),
            target_url: self.opt_field(raw, &self.fields.url),
            external_created_at: self.parse_created_at(raw),
        })
    }

    /// String field value, empty string when absent or non-string.
    fn str_field(&self, raw: &RawCreative, name: &str) -> String {
        raw.get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// String field value, None when absent or empty.
    fn opt_field(&self, raw: &RawCreative, name: &str) -> Option<String> {
        let value = self.str_field(raw, name);
        (!value.is_empty()).then_some(value)
    }

    /// Sources report status either as a bool flag or a string tag;
    /// anything unrecognized counts as active, matching upstream behavior.
    fn parse_status(&self, raw: &RawCreative) -> CreativeStatus {
        match raw.get(&self.fields.status) {
            Some(v) if v.is_boolean() => {
                if v.as_bool().unwrap_or(true) {
                    CreativeStatus::Active
                } else {
                    CreativeStatus::Inactive
                }
            }
            Some(v) => match v.as_str().unwrap_or("active").to_ascii_lowercase().as_str() {
                "inactive" | "paused" | "stopped" => CreativeStatus::Inactive,
                _ => CreativeStatus::Active,
            },
            None => CreativeStatus::Active,
        }
    }

    /// Parse the source-reported creation time. Epoch-zero and unparsable
    /// values are dropped rather than guessed at.
    fn parse_created_at(&self, raw: &RawCreative) -> Option<DateTime<Utc>> {
        let value = raw.get(&self.fields.created_at)?.as_str()?;
        let parsed = DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()?;
        (parsed.timestamp() > 0).then_some(parsed)
    }
}
