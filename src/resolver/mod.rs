// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resolution engine: the read path across both stores.
//!
//! ```text
//!   SearchQuery ──► plan ──► index query ──┬── hits ──► correlate ──► mask ──► index answer
//!                                          │
//!                                          └── none / degraded
//!                                                 │
//!                                                 ▼
//!                                          source search ──► mask ──► fallback answer
//!                                                 │
//!                                                 └──► schedule repair (background)
//! ```
//!
//! A degraded index and an empty index look the same from here: both fall
//! through to the source store. Only a source store failure on that last
//! step reaches the caller as an error. Exactly one store backs each
//! response; pages from the two stores are never stitched together.

mod plan;
mod types;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub use plan::{detect_mode, plan, QueryPlan, MAX_PAGE_SIZE};
pub use types::{
    CallerContext, EngineHealth, IngestOutcome, ResolutionOutcome, SearchFilters, SearchMode, SearchQuery,
};

use crate::config::ExposureEngineConfig;
use crate::correlator::Correlator;
use crate::error::ResolveError;
use crate::index_client::SearchIndexClient;
use crate::masking::MaskingPolicy;
use crate::metrics::{self, LatencyTimer};
use crate::record::{CanonicalRecord, IndexDocument, ResolvedResult, SourceStoreTag};
use crate::repair::{RepairOptions, SyncRepairer};
use crate::search::PageRequest;
use crate::storage::redis::RedisSearchIndex;
use crate::storage::sql::SqlSourceStore;
use crate::storage::traits::{SearchIndexStore, SourceStore, StorageError};

pub struct ExposureEngine {
    config: ExposureEngineConfig,
    index: Arc<SearchIndexClient>,
    source: Arc<dyn SourceStore>,
    correlator: Correlator,
    repairer: SyncRepairer,
    masking: MaskingPolicy,
}

impl ExposureEngine {
    /// Wire the engine over existing stores and start the repair workers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: ExposureEngineConfig,
        index_store: Arc<dyn SearchIndexStore>,
        source: Arc<dyn SourceStore>,
    ) -> Self {
        let index = Arc::new(SearchIndexClient::new(
            index_store,
            config.index_timeout(),
            config.index_circuit(),
        ));
        let repairer = SyncRepairer::start(index.clone(), RepairOptions::from_config(&config));

        Self {
            correlator: Correlator::new(source.clone()),
            config,
            index,
            source,
            repairer,
            masking: MaskingPolicy,
        }
    }

    /// Connect to Redis Stack and the SQL store named in `config`.
    pub async fn connect(config: ExposureEngineConfig) -> Result<Self, StorageError> {
        let redis_url = config
            .redis_url
            .clone()
            .ok_or_else(|| StorageError::Connection("redis_url is not configured".to_string()))?;
        let sql_url = config
            .sql_url
            .clone()
            .ok_or_else(|| StorageError::Connection("sql_url is not configured".to_string()))?;

        let index = RedisSearchIndex::with_prefix(&redis_url, config.redis_prefix.as_deref())
            .await?
            .with_max_results(config.index_max_results);
        let source = SqlSourceStore::with_max_connections(&sql_url, config.sql_max_connections).await?;

        info!(shard_prefix = %config.shard_prefix, "Exposure engine connected");
        Ok(Self::new(config, Arc::new(index), Arc::new(source)))
    }

    /// Resolve a search into caller-visible results.
    pub async fn resolve(
        &self,
        query: &SearchQuery,
        caller: &CallerContext,
    ) -> Result<Vec<ResolvedResult>, ResolveError> {
        Ok(self.resolve_detailed(query, caller).await?.results)
    }

    /// Like [`resolve`](Self::resolve), with the answering store and its paging info.
    pub async fn resolve_detailed(
        &self,
        query: &SearchQuery,
        caller: &CallerContext,
    ) -> Result<ResolutionOutcome, ResolveError> {
        let plan = match plan(
            query,
            &self.config.shard_prefix,
            self.config.default_months_back,
            Utc::now(),
        ) {
            Ok(plan) => plan,
            Err(e) => {
                metrics::record_resolution("invalid");
                debug!(error = %e, "Rejected search");
                return Err(e);
            }
        };
        debug!(
            caller = caller.caller_id.as_deref().unwrap_or("-"),
            mode = ?plan.mode,
            shards = %plan.shards.describe(),
            "Resolving search"
        );

        let hits = self.index.query(&plan.query, &plan.shards, &plan.page).await;

        if !hits.is_empty() {
            match self.source_call("find_by_ids", self.correlator.correlate(&hits.items)).await {
                Ok(correlation) => {
                    self.repair_stale(&hits.items, &correlation.records);
                    metrics::record_resolution("index");
                    let total = hits.total.saturating_sub(correlation.orphans.len() as u64);
                    return Ok(self.finish(correlation.records, SourceStoreTag::Index, total, &plan.page, caller));
                }
                Err(e) => {
                    warn!(error = %e, "Correlation failed, searching source store directly");
                }
            }
        } else {
            debug!(healthy = self.index.is_healthy(), "No index hits, searching source store");
        }

        let found = match self.source_call("search", self.source.search(&plan.query, &plan.page)).await {
            Ok(found) => found,
            Err(e) => {
                metrics::record_resolution("unavailable");
                error!(error = %e, "Source store unavailable during fallback");
                return Err(ResolveError::SourceUnavailable(e));
            }
        };

        if found.is_empty() {
            metrics::record_resolution("empty");
            return Ok(self.finish(Vec::new(), SourceStoreTag::Fallback, found.total, &plan.page, caller));
        }

        metrics::record_resolution("fallback");
        self.repairer.schedule_all(found.items.iter().cloned());
        Ok(self.finish(found.items, SourceStoreTag::Fallback, found.total, &plan.page, caller))
    }

    /// Store a new record and queue it for indexing.
    pub async fn ingest(&self, record: CanonicalRecord) -> Result<IngestOutcome, StorageError> {
        let exists = self
            .source_call("exists", self.source.exists(&record.login, &record.password, &record.url))
            .await
            .inspect_err(|_| metrics::record_ingest("error"))?;
        if exists {
            metrics::record_ingest("duplicate");
            debug!(id = %record.id, "Ingest skipped, record already stored");
            return Ok(IngestOutcome::Duplicate);
        }

        match self.source_call("upsert", self.source.upsert(&record)).await {
            Ok(()) => {}
            Err(StorageError::Conflict(reason)) => {
                metrics::record_ingest("duplicate");
                debug!(id = %record.id, reason = %reason, "Ingest lost a race with an identical record");
                return Ok(IngestOutcome::Duplicate);
            }
            Err(e) => {
                metrics::record_ingest("error");
                return Err(e);
            }
        }

        metrics::record_ingest("stored");
        self.repairer.schedule(record);
        Ok(IngestOutcome::Stored)
    }

    /// Probe the index and report.
    pub async fn health(&self) -> EngineHealth {
        let index_healthy = self.index.probe().await;
        EngineHealth {
            index_healthy,
            index_last_error: if index_healthy { None } else { self.index.last_error() },
            repair_pending: self.repairer.pending(),
        }
    }

    /// Stop accepting repairs and wait for queued ones to finish.
    pub async fn shutdown(&self) {
        info!(pending = self.repairer.pending(), "Shutting down exposure engine");
        self.repairer.shutdown().await;
    }

    pub fn config(&self) -> &ExposureEngineConfig {
        &self.config
    }

    pub fn index_client(&self) -> &SearchIndexClient {
        &self.index
    }

    pub fn repairer(&self) -> &SyncRepairer {
        &self.repairer
    }

    fn finish(
        &self,
        records: Vec<CanonicalRecord>,
        source: SourceStoreTag,
        total: u64,
        page: &PageRequest,
        caller: &CallerContext,
    ) -> ResolutionOutcome {
        let results = self.masking.mask_all(records, caller.plan_tier, source);
        metrics::record_results(results.len());
        debug!(source = %source, results = results.len(), total, "Resolved search");

        ResolutionOutcome {
            results,
            source,
            total,
            page: page.page,
            size: page.size,
        }
    }

    /// Re-index records whose indexed copy no longer matches the source.
    fn repair_stale(&self, hits: &[IndexDocument], records: &[CanonicalRecord]) {
        let indexed: HashMap<&str, &IndexDocument> = hits.iter().map(|h| (h.id.as_str(), h)).collect();
        for record in records {
            let Some(hit) = indexed.get(record.id.as_str()) else {
                continue;
            };
            if hit.login != record.login || hit.password != record.password || hit.url != record.url {
                debug!(id = %record.id, "Index copy is stale, scheduling repair");
                self.repairer.schedule(record.clone());
            }
        }
    }

    async fn source_call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let _timer = LatencyTimer::new("source", operation);
        let result = match timeout(self.config.source_timeout(), fut).await {
            Ok(inner) => inner,
            Err(_) => {
                metrics::record_timeout("source", operation);
                Err(StorageError::Timeout(operation))
            }
        };
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_operation("source", operation, status);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::masking::PlanTier;
    use crate::storage::memory::{InMemoryIndex, InMemorySourceStore};

    fn engine(index: Arc<InMemoryIndex>, source: Arc<InMemorySourceStore>) -> ExposureEngine {
        let config = ExposureEngineConfig {
            repair_base_delay_ms: 1,
            repair_max_delay_ms: 5,
            ..Default::default()
        };
        ExposureEngine::new(config, index, source)
    }

    #[tokio::test]
    async fn test_index_path_tags_index() {
        let index = Arc::new(InMemoryIndex::new());
        let source = Arc::new(InMemorySourceStore::new());
        let record = CanonicalRecord::new("alice@example.com", "hunter2", "https://example.com");
        source.insert(record.clone());
        index.insert("breaches-2024-03", record.to_index_document());

        let engine = engine(index, source);
        let outcome = engine
            .resolve_detailed(&SearchQuery::new("alice@example.com"), &CallerContext::new(PlanTier::Enterprise))
            .await
            .unwrap();

        assert_eq!(outcome.source, SourceStoreTag::Index);
        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.results[0].password, "hunter2");
        assert_eq!(outcome.results[0].source_store, SourceStoreTag::Index);
    }

    #[tokio::test]
    async fn test_fallback_path_schedules_repair() {
        let index = Arc::new(InMemoryIndex::new());
        let source = Arc::new(InMemorySourceStore::new());
        let record = CanonicalRecord::new("bob@example.com", "letmein", "https://example.com");
        source.insert(record.clone());

        let engine = engine(index.clone(), source);
        let results = engine
            .resolve(&SearchQuery::new("bob@example.com"), &CallerContext::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_store, SourceStoreTag::Fallback);
        assert_eq!(results[0].password, "le***in");

        engine.repairer().wait_idle().await;
        assert_eq!(index.doc_count(), 1);
    }

    #[tokio::test]
    async fn test_correlation_timeout_falls_back() {
        let index = Arc::new(InMemoryIndex::new());
        let source = Arc::new(InMemorySourceStore::new());
        let record = CanonicalRecord::new("carol", "pw12345", "https://example.com");
        index.insert("breaches-2024-03", record.to_index_document());
        source.set_latency(Some(Duration::from_millis(100)));

        let config = ExposureEngineConfig {
            source_timeout_ms: 20,
            ..Default::default()
        };
        let engine = ExposureEngine::new(config, index, source);
        let err = engine
            .resolve(&SearchQuery::new("carol").with_mode(SearchMode::Exact), &CallerContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::SourceUnavailable(StorageError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_ingest_then_duplicate() {
        let index = Arc::new(InMemoryIndex::new());
        let source = Arc::new(InMemorySourceStore::new());
        let engine = engine(index.clone(), source.clone());

        let record = CanonicalRecord::new("dave", "pw", "https://example.com");
        assert_eq!(engine.ingest(record.clone()).await.unwrap(), IngestOutcome::Stored);
        assert_eq!(engine.ingest(record).await.unwrap(), IngestOutcome::Duplicate);

        engine.shutdown().await;
        assert_eq!(source.len(), 1);
        assert_eq!(index.doc_count(), 1);
    }

    #[tokio::test]
    async fn test_health_reports_index_errors() {
        let index = Arc::new(InMemoryIndex::new());
        let source = Arc::new(InMemorySourceStore::new());
        let engine = engine(index.clone(), source);

        assert!(engine.health().await.index_healthy);

        index.set_failing(true);
        let health = engine.health().await;
        assert!(!health.index_healthy);
        assert!(health.index_last_error.is_some());
        assert_eq!(health.repair_pending, 0);
    }
}
