// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! RediSearch index backend.
//!
//! Each month shard is a RediSearch index over RedisJSON documents:
//!
//! ```text
//! key:    {redis_prefix}{shard}:{id}
//! index:  {redis_prefix}idx:{shard}
//! value:  {"id": "...", "login": "...", "password": "...", "url": "...",
//!          "timestamp": 1710460800000, "metadata": {"domain": "..."}}
//! ```
//!
//! Searches fan out to every targeted shard concurrently, each returning its
//! first `window` hits in sort order; the merged list is then sliced to the
//! requested page.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashSet;
use redis::aio::ConnectionManager;
use redis::{cmd, Client, Value};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::traits::{SearchIndexStore, StorageError};
use crate::record::IndexDocument;
use crate::resilience::retry::{retry, RetryConfig};
use crate::search::{
    compare_documents, document_key, index_name, shard_from_index_name, Page, PageRequest, Query,
    RediSearchTranslator, SearchIndex,
};
use crate::shard::ShardSelection;

pub struct RedisSearchIndex {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "myapp:" → "myapp:breaches-2024-03:abc")
    prefix: String,
    /// Upper bound on hits fetched from a single shard
    max_results: u64,
    /// Shards whose index is known to exist
    known_indexes: DashSet<String>,
}

/// Hits from one shard.
struct ShardHits {
    total: u64,
    docs: Vec<IndexDocument>,
}

impl RedisSearchIndex {
    /// Connect without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Connect with an optional key prefix.
    ///
    /// The prefix is prepended to index names and document keys, enabling
    /// namespacing when sharing a Redis instance with other applications.
    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Use startup config: fast-fail after ~30s, don't hang forever
        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Connection(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
            max_results: 10_000,
            known_indexes: DashSet::new(),
        })
    }

    /// Cap on hits fetched per shard.
    #[must_use]
    pub fn with_max_results(mut self, max_results: u64) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Get a clone of the connection manager
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Every shard that has an index under our prefix (FT._LIST).
    pub async fn list_shards(&self) -> Result<Vec<String>, StorageError> {
        let mut conn = self.connection.clone();
        let indexes: Vec<String> = cmd("FT._LIST")
            .query_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        let mut shards: Vec<String> = indexes
            .iter()
            .filter_map(|idx| shard_from_index_name(&self.prefix, idx))
            .map(str::to_string)
            .collect();
        shards.sort_unstable_by(|a, b| b.cmp(a));
        Ok(shards)
    }

    async fn resolve_shards(&self, selection: &ShardSelection) -> Result<Vec<String>, StorageError> {
        match selection {
            ShardSelection::Shards(names) => {
                let mut seen = HashSet::new();
                Ok(names.iter().filter(|n| seen.insert(n.as_str())).cloned().collect())
            }
            ShardSelection::Pattern(_) => Ok(self
                .list_shards()
                .await?
                .into_iter()
                .filter(|shard| selection.contains(shard))
                .collect()),
        }
    }

    /// Create the shard index unless we've already seen it.
    async fn ensure_index(&self, shard: &str) -> Result<(), StorageError> {
        if self.known_indexes.contains(shard) {
            return Ok(());
        }

        let args = SearchIndex::for_shard(shard).to_ft_create_args(&self.prefix);
        let mut conn = self.connection.clone();
        let result: Result<(), redis::RedisError> = cmd("FT.CREATE").arg(&args).query_async(&mut conn).await;

        match result {
            Ok(()) => debug!(shard = %shard, "Created shard index"),
            Err(e) if e.to_string().contains("Index already exists") => {}
            Err(e) => return Err(StorageError::Backend(e.to_string())),
        }

        self.known_indexes.insert(shard.to_string());
        Ok(())
    }

    async fn search_shard(
        mut conn: ConnectionManager,
        index: String,
        query: String,
        sort_field: &'static str,
        sort_dir: &'static str,
        window: u64,
    ) -> Result<ShardHits, redis::RedisError> {
        let value: Value = cmd("FT.SEARCH")
            .arg(&index)
            .arg(&query)
            .arg("RETURN")
            .arg(1)
            .arg("$")
            .arg("SORTBY")
            .arg(sort_field)
            .arg(sort_dir)
            .arg("LIMIT")
            .arg(0)
            .arg(window)
            .arg("DIALECT")
            .arg(2)
            .query_async(&mut conn)
            .await?;

        Ok(parse_search_reply(&index, value))
    }
}

/// Missing shards are expected (nothing was ever written to that month).
fn is_missing_index(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("unknown index name") || lower.contains("no such index")
}

/// Merge per-shard replies into one page.
///
/// Missing shard indexes count as empty. Failed shards are skipped unless
/// every shard failed, which is the only case that errors.
fn merge_shard_results(
    results: Vec<Result<ShardHits, String>>,
    page: &PageRequest,
) -> Result<Page<IndexDocument>, StorageError> {
    let attempted = results.len();
    let mut total = 0u64;
    let mut merged = Vec::new();
    let mut failures = 0usize;
    let mut last_error = None;

    for result in results {
        match result {
            Ok(hits) => {
                total += hits.total;
                merged.extend(hits.docs);
            }
            Err(e) if is_missing_index(&e) => {
                debug!(error = %e, "Shard index missing, treating as empty");
            }
            Err(e) => {
                warn!(error = %e, "Shard search failed");
                failures += 1;
                last_error = Some(e);
            }
        }
    }

    if attempted > 0 && failures == attempted {
        return Err(StorageError::Backend(
            last_error.unwrap_or_else(|| "all shard searches failed".to_string()),
        ));
    }

    merged.sort_by(|a, b| compare_documents(a, b, &page.sort));
    Ok(Page {
        items: page.slice(merged),
        total,
        page: page.page,
        size: page.size,
    })
}

/// Parse `[total, key, [field, json], key, [field, json], ...]`.
fn parse_search_reply(index: &str, value: Value) -> ShardHits {
    let Value::Array(items) = value else {
        warn!(index = %index, "Unexpected FT.SEARCH reply shape");
        return ShardHits { total: 0, docs: Vec::new() };
    };

    let mut iter = items.into_iter();
    let total = match iter.next() {
        Some(Value::Int(n)) => n.max(0) as u64,
        _ => 0,
    };

    let mut docs = Vec::new();
    while let (Some(_key), Some(fields)) = (iter.next(), iter.next()) {
        let Some(json) = extract_json_field(fields) else {
            continue;
        };
        match serde_json::from_slice::<IndexDocument>(&json) {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!(index = %index, error = %e, "Skipping unparseable index document"),
        }
    }

    ShardHits { total, docs }
}

fn extract_json_field(fields: Value) -> Option<Vec<u8>> {
    let Value::Array(pairs) = fields else {
        return None;
    };
    let mut iter = pairs.into_iter();
    while let (Some(_name), Some(value)) = (iter.next(), iter.next()) {
        match value {
            Value::BulkString(bytes) => return Some(bytes),
            Value::SimpleString(s) => return Some(s.into_bytes()),
            _ => continue,
        }
    }
    None
}

#[async_trait]
impl SearchIndexStore for RedisSearchIndex {
    async fn search(
        &self,
        query: &Query,
        shards: &ShardSelection,
        page: &PageRequest,
    ) -> Result<Page<IndexDocument>, StorageError> {
        let targets = self.resolve_shards(shards).await?;
        if targets.is_empty() {
            return Ok(Page::empty(page));
        }

        let query_str = RediSearchTranslator::translate(query);
        let window = page.window().min(self.max_results);
        let sort_field = page.sort.field.as_str();
        let sort_dir = page.sort.direction.keyword();

        debug!(shards = targets.len(), query = %query_str, window, "FT.SEARCH fan-out");

        let mut set = JoinSet::new();
        for shard in &targets {
            let index = index_name(&self.prefix, shard);
            set.spawn(Self::search_shard(
                self.connection.clone(),
                index,
                query_str.clone(),
                sort_field,
                sort_dir,
                window,
            ));
        }

        let mut results = Vec::with_capacity(targets.len());
        while let Some(joined) = set.join_next().await {
            results.push(match joined {
                Ok(Ok(hits)) => Ok(hits),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("shard search task panicked: {}", e)),
            });
        }

        merge_shard_results(results, page)
    }

    async fn upsert(&self, shard: &str, doc: &IndexDocument) -> Result<(), StorageError> {
        self.ensure_index(shard).await?;

        let key = document_key(&self.prefix, shard, &doc.id);
        let json = serde_json::to_string(doc).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut conn = self.connection.clone();
        // JSON.SET key $ <json>
        let _: () = cmd("JSON.SET")
            .arg(&key)
            .arg("$")
            .arg(&json)
            .query_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let _: String = cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
