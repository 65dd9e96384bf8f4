// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory stores for tests and demos.
//!
//! Both evaluate queries with [`crate::search::matches`] and support fault
//! injection so the degraded paths of the engine can be exercised without
//! real backends.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::traits::{SearchIndexStore, SourceStore, StorageError};
use crate::record::{record_id, CanonicalRecord, IndexDocument};
use crate::search::{compare_documents, matches, Page, PageRequest, Query};
use crate::shard::ShardSelection;

/// Fault switches shared by both memory stores.
#[derive(Default)]
struct Faults {
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl Faults {
    async fn apply(&self, op: &'static str) -> Result<(), StorageError> {
        let latency = *self.latency.lock();
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::Acquire) {
            return Err(StorageError::Connection(format!("injected failure in {}", op)));
        }
        Ok(())
    }
}

/// Time-sharded index held in memory: shard → (id → document).
#[derive(Default)]
pub struct InMemoryIndex {
    shards: DashMap<String, DashMap<String, IndexDocument>>,
    faults: Faults,
    failing_upserts: AtomicUsize,
    search_calls: AtomicU64,
    upsert_calls: AtomicU64,
}

impl InMemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a connection error.
    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::Release);
    }

    /// Delay every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.faults.latency.lock() = latency;
    }

    /// Fail the next `n` upserts, then recover.
    pub fn fail_next_upserts(&self, n: usize) {
        self.failing_upserts.store(n, Ordering::Release);
    }

    /// Insert directly, bypassing faults. Useful for seeding stale or orphan documents.
    pub fn insert(&self, shard: &str, doc: IndexDocument) {
        self.shards
            .entry(shard.to_string())
            .or_default()
            .insert(doc.id.clone(), doc);
    }

    pub fn get(&self, shard: &str, id: &str) -> Option<IndexDocument> {
        self.shards.get(shard)?.get(id).map(|d| d.value().clone())
    }

    /// Total documents across all shards.
    pub fn doc_count(&self) -> usize {
        self.shards.iter().map(|s| s.value().len()).sum()
    }

    /// Shard names, most recent first.
    pub fn shard_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shards.iter().map(|s| s.key().clone()).collect();
        names.sort_unstable_by(|a, b| b.cmp(a));
        names
    }

    pub fn search_calls(&self) -> u64 {
        self.search_calls.load(Ordering::Relaxed)
    }

    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.shards.clear();
    }
}

#[async_trait]
impl SearchIndexStore for InMemoryIndex {
    async fn search(
        &self,
        query: &Query,
        shards: &ShardSelection,
        page: &PageRequest,
    ) -> Result<Page<IndexDocument>, StorageError> {
        self.search_calls.fetch_add(1, Ordering::Relaxed);
        self.faults.apply("index_search").await?;

        let mut hits: Vec<IndexDocument> = self
            .shards
            .iter()
            .filter(|shard| shards.contains(shard.key()))
            .flat_map(|shard| {
                shard
                    .value()
                    .iter()
                    .filter(|doc| matches(query, doc.value()))
                    .map(|doc| doc.value().clone())
                    .collect::<Vec<_>>()
            })
            .collect();

        let total = hits.len() as u64;
        hits.sort_by(|a, b| compare_documents(a, b, &page.sort));
        Ok(Page {
            items: page.slice(hits),
            total,
            page: page.page,
            size: page.size,
        })
    }

    async fn upsert(&self, shard: &str, doc: &IndexDocument) -> Result<(), StorageError> {
        self.upsert_calls.fetch_add(1, Ordering::Relaxed);
        self.faults.apply("index_upsert").await?;

        let remaining = self.failing_upserts.load(Ordering::Acquire);
        if remaining > 0
            && self
                .failing_upserts
                .compare_exchange(remaining, remaining - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            return Err(StorageError::Backend("injected upsert failure".to_string()));
        }

        self.insert(shard, doc.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.faults.apply("index_ping").await
    }
}

/// Source-of-truth store held in memory, keyed by id.
#[derive(Default)]
pub struct InMemorySourceStore {
    records: DashMap<String, CanonicalRecord>,
    faults: Faults,
    find_calls: AtomicU64,
    search_calls: AtomicU64,
}

impl InMemorySourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::Release);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.faults.latency.lock() = latency;
    }

    /// Insert directly, bypassing faults and the triple uniqueness check.
    pub fn insert(&self, record: CanonicalRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<CanonicalRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find_calls(&self) -> u64 {
        self.find_calls.load(Ordering::Relaxed)
    }

    pub fn search_calls(&self) -> u64 {
        self.search_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SourceStore for InMemorySourceStore {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<CanonicalRecord>, StorageError> {
        self.find_calls.fetch_add(1, Ordering::Relaxed);
        self.faults.apply("source_find_by_ids").await?;

        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.value().clone()))
            .collect())
    }

    async fn search(&self, query: &Query, page: &PageRequest) -> Result<Page<CanonicalRecord>, StorageError> {
        self.search_calls.fetch_add(1, Ordering::Relaxed);
        self.faults.apply("source_search").await?;

        let mut hits: Vec<CanonicalRecord> = self
            .records
            .iter()
            .filter(|r| matches(query, r.value()))
            .map(|r| r.value().clone())
            .collect();

        let total = hits.len() as u64;
        hits.sort_by(|a, b| compare_documents(a, b, &page.sort));
        Ok(Page {
            items: page.slice(hits),
            total,
            page: page.page,
            size: page.size,
        })
    }

    async fn exists(&self, login: &str, password: &str, url: &str) -> Result<bool, StorageError> {
        self.faults.apply("source_exists").await?;
        Ok(self
            .records
            .iter()
            .any(|r| r.login == login && r.password == password && r.url == url))
    }

    async fn upsert(&self, record: &CanonicalRecord) -> Result<(), StorageError> {
        self.faults.apply("source_upsert").await?;

        let triple = record_id(&record.login, &record.password, &record.url);
        let clash = self
            .records
            .iter()
            .find(|r| r.key() != &record.id && record_id(&r.login, &r.password, &r.url) == triple)
            .map(|r| r.key().clone());
        if let Some(existing) = clash {
            return Err(StorageError::Conflict(format!("triple already stored under id {}", existing)));
        }

        match self.records.get_mut(&record.id) {
            Some(mut existing) => {
                let created_at = existing.created_at;
                *existing = record.clone();
                existing.created_at = created_at;
            }
            None => {
                self.records.insert(record.id.clone(), record.clone());
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.faults.apply("source_ping").await
    }
}
