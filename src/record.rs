// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Breach record data model.
//!
//! Three shapes flow through the engine:
//!
//! - [`CanonicalRecord`]: the source-of-truth entity owned by the source store.
//! - [`IndexDocument`]: a denormalized projection written into a time shard.
//!   Never authoritative; only its `id` is trusted (it is the correlation key).
//! - [`ResolvedResult`]: what a caller sees after correlation and masking.
//!
//! # Example
//!
//! ```
//! use exposure_engine::CanonicalRecord;
//!
//! let record = CanonicalRecord::new("alice@example.com", "hunter2", "https://www.example.com/login");
//!
//! assert_eq!(record.domain, "example.com");
//! assert_eq!(record.id.len(), 64); // hex sha-256 of (login, password, url)
//!
//! let doc = record.to_index_document();
//! assert_eq!(doc.id, record.id);
//! assert_eq!(doc.metadata["domain"], "example.com");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Field names shared by the index schema, the SQL columns and the query AST.
pub mod fields {
    pub const ID: &str = "id";
    pub const LOGIN: &str = "login";
    pub const PASSWORD: &str = "password";
    pub const URL: &str = "url";
    pub const DOMAIN: &str = "domain";
    pub const TIMESTAMP: &str = "timestamp";
}

/// Stable content-derived identifier for a `(login, password, url)` triple.
///
/// Lowercase hex SHA-256 over the three values joined by the ASCII unit
/// separator, so `("a", "bc", "d")` and `("ab", "c", "d")` never collide.
pub fn record_id(login: &str, password: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(login.as_bytes());
    hasher.update([0x1f]);
    hasher.update(password.as_bytes());
    hasher.update([0x1f]);
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the host part of a URL for display and domain filtering.
///
/// Tolerates scheme-less input (`example.com/login`), userinfo, ports and a
/// leading `www.`. Returns an empty string when no host can be found.
pub fn derive_domain(url: &str) -> String {
    let trimmed = url.trim();
    let rest = match trimmed.find("://") {
        Some(pos) => &trimmed[pos + 3..],
        None => trimmed,
    };

    let authority_end = rest
        .find(|c: char| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    let authority = &rest[..authority_end];

    // user:pass@host
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    let host = match host_port.rfind(':') {
        Some(pos) if host_port[pos + 1..].chars().all(|c| c.is_ascii_digit()) => &host_port[..pos],
        _ => host_port,
    };

    let host = host.trim().trim_end_matches('.').to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// The authoritative breach entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    /// Content-derived key, see [`record_id`]
    pub id: String,
    pub login: String,
    pub password: String,
    pub url: String,
    /// Host derived from `url`
    pub domain: String,
    /// Free-form enrichment data
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// When the credential was observed in the leak. Selects the index shard.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Which feed or dump the record came from
    #[serde(default)]
    pub source_tag: Option<String>,
}

impl CanonicalRecord {
    /// Build a fresh record; `id` and `domain` are derived from the triple.
    pub fn new(login: impl Into<String>, password: impl Into<String>, url: impl Into<String>) -> Self {
        let login = login.into();
        let password = password.into();
        let url = url.into();
        let now = Utc::now();
        Self {
            id: record_id(&login, &password, &url),
            domain: derive_domain(&url),
            login,
            password,
            url,
            metadata: Map::new(),
            timestamp: None,
            created_at: now,
            updated_at: now,
            source_tag: None,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = Some(tag.into());
        self
    }

    /// The instant whose month selects the index shard for this record.
    pub fn shard_time(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }

    /// Project into the search-optimized shape.
    ///
    /// Derived fields (`domain`, `source_tag`) are copied into the document's
    /// metadata so they stay searchable without extra index columns.
    pub fn to_index_document(&self) -> IndexDocument {
        let mut metadata = self.metadata.clone();
        metadata.insert(fields::DOMAIN.to_string(), Value::String(self.domain.clone()));
        if let Some(ref tag) = self.source_tag {
            metadata.insert("source_tag".to_string(), Value::String(tag.clone()));
        }

        IndexDocument {
            id: self.id.clone(),
            login: self.login.clone(),
            password: self.password.clone(),
            url: self.url.clone(),
            timestamp: Some(self.shard_time()),
            metadata: Value::Object(metadata),
        }
    }
}

/// Search projection stored in a month shard.
///
/// Timestamps are epoch millis on the wire so RediSearch can index them as
/// NUMERIC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub login: String,
    pub password: String,
    pub url: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
}

/// Which store answered a resolution. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStoreTag {
    Index,
    Fallback,
}

impl SourceStoreTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for SourceStoreTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-visible record: canonical values with the password masked per plan tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedResult {
    pub id: String,
    pub login: String,
    pub password: String,
    pub url: String,
    pub domain: String,
    pub metadata: Map<String, Value>,
    pub timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source_tag: Option<String>,
    pub masking_applied: bool,
    pub source_store: SourceStoreTag,
}
