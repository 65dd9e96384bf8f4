// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shard Index Schema
//!
//! Every month shard gets its own RediSearch index over JSON documents whose
//! keys start with `{redis_prefix}{shard}:`.
//!
//! # RediSearch Index Creation
//!
//! ```text
//! FT.CREATE idx:breaches-2024-03
//!   ON JSON
//!   PREFIX 1 breaches-2024-03:
//!   STOPWORDS 0
//!   SCHEMA
//!     $.login AS login TAG SORTABLE
//!     $.login AS login_text TEXT
//!     $.password AS password TEXT
//!     $.url AS url TEXT SORTABLE
//!     $.metadata.domain AS domain TEXT
//!     $.timestamp AS timestamp NUMERIC SORTABLE
//! ```

use crate::record::fields;

/// TEXT twin of the `login` TAG, used for substring and prefix queries.
pub const LOGIN_TEXT_FIELD: &str = "login_text";

/// Fields indexed as TAG (exact match only).
pub const TAG_FIELDS: &[&str] = &[fields::LOGIN];

const INDEX_NAME_PREFIX: &str = "idx:";

/// Index name for a shard: `{redis_prefix}idx:{shard}`
pub fn index_name(redis_prefix: &str, shard: &str) -> String {
    format!("{}{}{}", redis_prefix, INDEX_NAME_PREFIX, shard)
}

/// Recover the shard name from an index name, if it belongs to `redis_prefix`.
pub fn shard_from_index_name<'a>(redis_prefix: &str, index: &'a str) -> Option<&'a str> {
    index.strip_prefix(redis_prefix)?.strip_prefix(INDEX_NAME_PREFIX)
}

/// Redis key of one document: `{redis_prefix}{shard}:{id}`
pub fn document_key(redis_prefix: &str, shard: &str, id: &str) -> String {
    format!("{}{}:{}", redis_prefix, shard, id)
}

/// Search index definition
#[derive(Debug, Clone)]
pub struct SearchIndex {
    /// Shard name (will be prefixed with "idx:")
    pub name: String,
    /// Key prefix this index covers (e.g., "breaches-2024-03:")
    pub prefix: String,
    /// Field definitions for the index
    pub fields: Vec<SearchField>,
}

impl SearchIndex {
    /// Create a new search index definition
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            fields: Vec::new(),
        }
    }

    /// The breach document schema for one month shard.
    pub fn for_shard(shard: &str) -> Self {
        Self::new(shard, format!("{}:", shard))
            .field(fields::LOGIN, None, SearchFieldType::Tag, true)
            .field(LOGIN_TEXT_FIELD, Some("$.login"), SearchFieldType::Text, false)
            .field(fields::PASSWORD, None, SearchFieldType::Text, false)
            .field(fields::URL, None, SearchFieldType::Text, true)
            .field(fields::DOMAIN, Some("$.metadata.domain"), SearchFieldType::Text, false)
            .field(fields::TIMESTAMP, None, SearchFieldType::Numeric, true)
    }

    /// Add a field; `json_path` defaults to `$.{name}`
    pub fn field(
        mut self,
        name: impl Into<String>,
        json_path: Option<&str>,
        field_type: SearchFieldType,
        sortable: bool,
    ) -> Self {
        self.fields.push(SearchField {
            name: name.into(),
            json_path: json_path.map(str::to_string),
            field_type,
            sortable,
        });
        self
    }

    /// Generate FT.CREATE args with the global redis prefix
    ///
    /// The redis_prefix is prepended to both the index name and the key prefix
    /// to match the actual key structure in Redis.
    pub fn to_ft_create_args(&self, redis_prefix: &str) -> Vec<String> {
        let mut args = vec![
            index_name(redis_prefix, &self.name),
            "ON".to_string(),
            "JSON".to_string(),
            "PREFIX".to_string(),
            "1".to_string(),
            format!("{}{}", redis_prefix, self.prefix),
            // Keep every url/login token searchable, "at" and "to" included
            "STOPWORDS".to_string(),
            "0".to_string(),
            "SCHEMA".to_string(),
        ];

        for field in &self.fields {
            args.extend(field.to_schema_args());
        }

        args
    }
}

/// Search field definition
#[derive(Debug, Clone)]
pub struct SearchField {
    /// Field name (used in queries)
    pub name: String,
    /// JSON path (defaults to $.{name})
    pub json_path: Option<String>,
    pub field_type: SearchFieldType,
    pub sortable: bool,
}

impl SearchField {
    fn to_schema_args(&self) -> Vec<String> {
        let json_path = self
            .json_path
            .clone()
            .unwrap_or_else(|| format!("$.{}", self.name));

        let mut args = vec![
            json_path,
            "AS".to_string(),
            self.name.clone(),
            self.field_type.to_string(),
        ];

        if self.sortable {
            args.push("SORTABLE".to_string());
        }

        args
    }
}

/// Search field types used by the shard schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFieldType {
    /// Full-text searchable field
    Text,
    /// Numeric field (supports range queries)
    Numeric,
    /// Tag field (exact match)
    Tag,
}

impl std::fmt::Display for SearchFieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchFieldType::Text => write!(f, "TEXT"),
            SearchFieldType::Numeric => write!(f, "NUMERIC"),
            SearchFieldType::Tag => write!(f, "TAG"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_schema_command() {
        let args = SearchIndex::for_shard("breaches-2024-03").to_ft_create_args("");
        let cmd = format!("FT.CREATE {}", args.join(" "));

        assert!(cmd.starts_with("FT.CREATE idx:breaches-2024-03 ON JSON PREFIX 1 breaches-2024-03: STOPWORDS 0 SCHEMA"));
        assert!(cmd.contains("$.login AS login TAG SORTABLE"));
        assert!(cmd.contains("$.login AS login_text TEXT"));
        assert!(cmd.contains("$.url AS url TEXT SORTABLE"));
        assert!(cmd.contains("$.metadata.domain AS domain TEXT"));
        assert!(cmd.contains("$.timestamp AS timestamp NUMERIC SORTABLE"));
    }

    #[test]
    fn test_redis_prefix_applies_to_index_and_keys() {
        let args = SearchIndex::for_shard("breaches-2024-03").to_ft_create_args("app:");
        assert_eq!(args[0], "app:idx:breaches-2024-03");
        assert_eq!(args[5], "app:breaches-2024-03:");
        assert_eq!(document_key("app:", "breaches-2024-03", "abc"), "app:breaches-2024-03:abc");
    }

    #[test]
    fn test_shard_from_index_name() {
        assert_eq!(shard_from_index_name("app:", "app:idx:breaches-2024-03"), Some("breaches-2024-03"));
        assert_eq!(shard_from_index_name("", "idx:breaches-2024-03"), Some("breaches-2024-03"));
        assert_eq!(shard_from_index_name("app:", "other:idx:breaches-2024-03"), None);
        assert_eq!(shard_from_index_name("", "breaches-2024-03"), None);
    }
}
