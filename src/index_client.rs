// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Health-aware wrapper around the search index.
//!
//! Reads never fail past this boundary: a transport error, a timeout or an
//! open circuit all come back as an empty page, and the failure is recorded
//! in the health flag, the logs and the metrics instead. The resolver can
//! then treat "index degraded" exactly like "index empty".
//!
//! Writes (repairs) do propagate errors so the retry loop can see them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::metrics::{self, LatencyTimer};
use crate::record::IndexDocument;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError, CircuitState};
use crate::search::{Page, PageRequest, Query};
use crate::shard::ShardSelection;
use crate::storage::traits::{SearchIndexStore, StorageError};

const STORE: &str = "index";

pub struct SearchIndexClient {
    store: Arc<dyn SearchIndexStore>,
    call_timeout: Duration,
    circuit: CircuitBreaker,
    healthy: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl SearchIndexClient {
    pub fn new(store: Arc<dyn SearchIndexStore>, call_timeout: Duration, circuit: CircuitConfig) -> Self {
        Self {
            store,
            call_timeout,
            circuit: CircuitBreaker::new("index", circuit),
            healthy: AtomicBool::new(true),
            last_error: Mutex::new(None),
        }
    }

    /// Run a structured query over `shards`.
    ///
    /// Any failure yields `Page::empty(page)`.
    pub async fn query(&self, query: &Query, shards: &ShardSelection, page: &PageRequest) -> Page<IndexDocument> {
        let _timer = LatencyTimer::new(STORE, "search");
        let store = &self.store;
        let budget = self.call_timeout;

        let result = self
            .circuit
            .call(|| async move {
                match timeout(budget, store.search(query, shards, page)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(StorageError::Timeout("index_search")),
                }
            })
            .await;

        match result {
            Ok(found) => {
                self.mark_healthy();
                metrics::record_operation(STORE, "search", "success");
                debug!(shards = %shards.describe(), hits = found.items.len(), total = found.total, "Index query answered");
                found
            }
            Err(CircuitError::Rejected) => {
                metrics::record_operation(STORE, "search", "rejected");
                debug!(shards = %shards.describe(), "Index circuit open, skipping query");
                self.mark_unhealthy("circuit open".to_string());
                Page::empty(page)
            }
            Err(CircuitError::Inner(e)) => {
                let status = if matches!(e, StorageError::Timeout(_)) {
                    metrics::record_timeout(STORE, "search");
                    "timeout"
                } else {
                    "error"
                };
                metrics::record_operation(STORE, "search", status);
                warn!(shards = %shards.describe(), error = %e, "Index query failed, treating as zero hits");
                self.mark_unhealthy(e.to_string());
                Page::empty(page)
            }
        }
    }

    /// Write a document into `shard`, bounded by the call timeout.
    pub async fn upsert(&self, shard: &str, doc: &IndexDocument) -> Result<(), StorageError> {
        let _timer = LatencyTimer::new(STORE, "upsert");

        let result = match timeout(self.call_timeout, self.store.upsert(shard, doc)).await {
            Ok(inner) => inner,
            Err(_) => {
                metrics::record_timeout(STORE, "upsert");
                Err(StorageError::Timeout("index_upsert"))
            }
        };

        match &result {
            Ok(()) => {
                metrics::record_operation(STORE, "upsert", "success");
                self.mark_healthy();
            }
            Err(e) => {
                metrics::record_operation(STORE, "upsert", "error");
                if e.is_transient() {
                    self.mark_unhealthy(e.to_string());
                }
            }
        }
        result
    }

    /// Ping the backend and refresh the health flag.
    pub async fn probe(&self) -> bool {
        let outcome = match timeout(self.call_timeout, self.store.ping()).await {
            Ok(inner) => inner,
            Err(_) => Err(StorageError::Timeout("index_ping")),
        };

        match outcome {
            Ok(()) => {
                self.mark_healthy();
                true
            }
            Err(e) => {
                warn!(error = %e, "Index health probe failed");
                self.mark_unhealthy(e.to_string());
                false
            }
        }
    }

    /// Last observed health. No I/O.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.state()
    }

    fn mark_healthy(&self) {
        if !self.healthy.swap(true, Ordering::AcqRel) {
            debug!("Index recovered");
            metrics::set_backend_healthy(STORE, true);
        }
    }

    fn mark_unhealthy(&self, error: String) {
        if self.healthy.swap(false, Ordering::AcqRel) {
            metrics::set_backend_healthy(STORE, false);
        }
        *self.last_error.lock() = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CanonicalRecord;
    use crate::search::SortSpec;
    use crate::storage::memory::InMemoryIndex;

    fn page() -> PageRequest {
        PageRequest::new(0, 10, SortSpec::default())
    }

    fn all() -> ShardSelection {
        ShardSelection::Pattern("breaches-*".into())
    }

    fn client(index: Arc<InMemoryIndex>, call_timeout: Duration) -> SearchIndexClient {
        SearchIndexClient::new(index, call_timeout, CircuitConfig::new(100, Duration::from_secs(30)))
    }

    #[tokio::test]
    async fn test_query_returns_hits() {
        let index = Arc::new(InMemoryIndex::new());
        let doc = CanonicalRecord::new("alice@example.com", "pw", "https://example.com").to_index_document();
        index.insert("breaches-2024-03", doc.clone());

        let client = client(index, Duration::from_secs(1));
        let found = client.query(&Query::term("login", "alice@example.com"), &all(), &page()).await;

        assert_eq!(found.items, vec![doc]);
        assert!(client.is_healthy());
        assert!(client.last_error().is_none());
    }

    #[tokio::test]
    async fn test_failure_is_empty_page_and_unhealthy() {
        let index = Arc::new(InMemoryIndex::new());
        index.set_failing(true);

        let client = client(index.clone(), Duration::from_secs(1));
        let found = client.query(&Query::match_all(), &all(), &page()).await;

        assert!(found.is_empty());
        assert_eq!(found.total, 0);
        assert!(!client.is_healthy());
        assert!(client.last_error().unwrap().contains("injected failure"));

        index.set_failing(false);
        assert!(client.probe().await);
        assert!(client.is_healthy());
    }

    #[tokio::test]
    async fn test_timeout_is_empty_page() {
        let index = Arc::new(InMemoryIndex::new());
        index.insert(
            "breaches-2024-03",
            CanonicalRecord::new("a", "b", "https://c.com").to_index_document(),
        );
        index.set_latency(Some(Duration::from_millis(200)));

        let client = client(index, Duration::from_millis(20));
        let found = client.query(&Query::match_all(), &all(), &page()).await;

        assert!(found.is_empty());
        assert!(!client.is_healthy());
        assert!(client.last_error().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_open_circuit_skips_backend() {
        let index = Arc::new(InMemoryIndex::new());
        index.set_failing(true);
        let client = SearchIndexClient::new(
            index.clone(),
            Duration::from_secs(1),
            CircuitConfig::new(2, Duration::from_secs(60)),
        );

        for _ in 0..4 {
            client.query(&Query::match_all(), &all(), &page()).await;
        }
        let calls_before = index.search_calls();
        let found = client.query(&Query::match_all(), &all(), &page()).await;

        assert!(found.is_empty());
        assert_eq!(index.search_calls(), calls_before);
        assert_eq!(client.circuit_state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_upsert_propagates_errors() {
        let index = Arc::new(InMemoryIndex::new());
        index.fail_next_upserts(1);
        let client = client(index.clone(), Duration::from_secs(1));
        let doc = CanonicalRecord::new("a", "b", "https://c.com").to_index_document();

        assert!(client.upsert("breaches-2024-03", &doc).await.is_err());
        assert!(client.upsert("breaches-2024-03", &doc).await.is_ok());
        assert_eq!(index.get("breaches-2024-03", &doc.id), Some(doc));
    }
}
