// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request and response types for the resolution engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::masking::PlanTier;
use crate::record::{ResolvedResult, SourceStoreTag};
use crate::search::SortDirection;

/// How the free-text query is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchMode {
    /// Guess from the shape of the text
    #[default]
    Auto,
    /// Login equals the text
    Exact,
    /// Login or url contains the text
    Partial,
    /// Url contains the text
    DomainOnly,
    /// Login contains the text
    UsernameOnly,
    /// Url matches a `*`/`?` pattern
    Wildcard,
}

/// Optional narrowing applied on top of the mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

/// A caller's search.
///
/// ```
/// use exposure_engine::{SearchMode, SearchQuery};
///
/// let query = SearchQuery::new("alice@example.com")
///     .with_mode(SearchMode::Exact)
///     .with_page(0, 50)
///     .with_months_back(6);
/// assert_eq!(query.size, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    /// `<= 0` searches all time; `None` uses the engine default
    #[serde(default)]
    pub months_back: Option<i32>,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub filters: SearchFilters,
}

fn default_size() -> u32 {
    20
}

fn default_sort_by() -> String {
    "timestamp".to_string()
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: SearchMode::Auto,
            page: 0,
            size: default_size(),
            months_back: None,
            sort_by: default_sort_by(),
            sort_direction: SortDirection::Desc,
            filters: SearchFilters::default(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: u32, size: u32) -> Self {
        self.page = page;
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_months_back(mut self, months_back: i32) -> Self {
        self.months_back = Some(months_back);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort_by: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_by = sort_by.into();
        self.sort_direction = direction;
        self
    }

    #[must_use]
    pub fn with_domain_filter(mut self, domain: impl Into<String>) -> Self {
        self.filters.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_date_range(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.filters.from = from;
        self.filters.to = to;
        self
    }
}

/// Who is asking. Entitlements are resolved upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    pub plan_tier: PlanTier,
    #[serde(default)]
    pub caller_id: Option<String>,
}

impl CallerContext {
    pub fn new(plan_tier: PlanTier) -> Self {
        Self {
            plan_tier,
            caller_id: None,
        }
    }

    #[must_use]
    pub fn with_caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }
}

/// Results plus the paging info of the store that answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub results: Vec<ResolvedResult>,
    pub source: SourceStoreTag,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

/// What happened to an ingested record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Written to the source store and queued for indexing
    Stored,
    /// The same (login, password, url) was already stored
    Duplicate,
}

/// Snapshot returned by [`ExposureEngine::health`](super::ExposureEngine::health).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineHealth {
    pub index_healthy: bool,
    pub index_last_error: Option<String>,
    pub repair_pending: usize,
}
