// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index hits → canonical records.
//!
//! The index payload may be stale, so every hit is re-read from the source
//! store by id in one batched call. Only what the source store returns ever
//! reaches the caller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::metrics;
use crate::record::{CanonicalRecord, IndexDocument};
use crate::storage::traits::{SourceStore, StorageError};

/// Result of correlating one page of index hits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    /// Canonical records in index hit order
    pub records: Vec<CanonicalRecord>,
    /// Hit ids the source store doesn't know about
    pub orphans: Vec<String>,
}

pub struct Correlator {
    source: Arc<dyn SourceStore>,
}

impl Correlator {
    pub fn new(source: Arc<dyn SourceStore>) -> Self {
        Self { source }
    }

    pub async fn correlate(&self, hits: &[IndexDocument]) -> Result<Correlation, StorageError> {
        let mut seen = HashSet::with_capacity(hits.len());
        let ids: Vec<String> = hits
            .iter()
            .filter(|hit| seen.insert(hit.id.as_str()))
            .map(|hit| hit.id.clone())
            .collect();

        if ids.is_empty() {
            return Ok(Correlation::default());
        }

        let fetched = self.source.find_by_ids(&ids).await?;
        let mut by_id: HashMap<String, CanonicalRecord> =
            fetched.into_iter().map(|r| (r.id.clone(), r)).collect();

        let mut correlation = Correlation {
            records: Vec::with_capacity(ids.len()),
            orphans: Vec::new(),
        };
        for id in ids {
            match by_id.remove(&id) {
                Some(record) => correlation.records.push(record),
                None => correlation.orphans.push(id),
            }
        }

        if !correlation.orphans.is_empty() {
            metrics::record_orphans(correlation.orphans.len());
            warn!(
                orphans = correlation.orphans.len(),
                first = %correlation.orphans[0],
                "Index hits missing from source store"
            );
        }
        debug!(resolved = correlation.records.len(), "Correlated index hits");

        Ok(correlation)
    }
}
