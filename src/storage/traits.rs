// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{CanonicalRecord, IndexDocument};
use crate::search::{Page, PageRequest, Query};
use crate::shard::ShardSelection;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Item not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation '{0}' timed out")]
    Timeout(&'static str),
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Uniqueness violation, e.g. the same (login, password, url) under a different id
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl StorageError {
    /// Worth retrying: the backend may recover on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Connection(_) | Self::Timeout(_))
    }
}

/// Time-sharded search index (RediSearch in production).
///
/// Documents are projections, never authoritative. Implementations must
/// tolerate shards that don't exist yet by treating them as empty.
#[async_trait]
pub trait SearchIndexStore: Send + Sync {
    /// Search the selected shards, merge hits by `page.sort` and return the requested page.
    ///
    /// Fails only when every targeted shard failed.
    async fn search(
        &self,
        query: &Query,
        shards: &ShardSelection,
        page: &PageRequest,
    ) -> Result<Page<IndexDocument>, StorageError>;

    /// Insert or replace a document (keyed by `doc.id`) in `shard`, creating the shard if needed.
    async fn upsert(&self, shard: &str, doc: &IndexDocument) -> Result<(), StorageError>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<(), StorageError>;
}

/// Authoritative record store (MySQL/SQLite in production).
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Fetch records by id. Missing ids are silently omitted; order is unspecified.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<CanonicalRecord>, StorageError>;

    /// Evaluate `query` directly against the source of truth.
    async fn search(
        &self,
        query: &Query,
        page: &PageRequest,
    ) -> Result<Page<CanonicalRecord>, StorageError>;

    /// Whether a record with exactly this triple is stored.
    async fn exists(&self, login: &str, password: &str, url: &str) -> Result<bool, StorageError>;

    /// Insert or update by id.
    async fn upsert(&self, record: &CanonicalRecord) -> Result<(), StorageError>;

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
