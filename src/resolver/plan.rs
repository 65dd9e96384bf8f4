// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SearchQuery → structured query, shard selection and page request.
//!
//! Everything here runs before any store is contacted, so validation
//! failures never cost a round trip.

use chrono::{DateTime, Utc};

use super::types::{SearchMode, SearchQuery};
use crate::error::ResolveError;
use crate::record::fields;
use crate::search::{PageRequest, Query, SortField, SortSpec};
use crate::shard::{shard_range, shard_set_at, wildcard_pattern, ShardSelection};

pub const MAX_PAGE_SIZE: u32 = 100;

/// A validated search, ready for either store.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub mode: SearchMode,
    pub query: Query,
    pub shards: ShardSelection,
    pub page: PageRequest,
}

pub fn plan(
    search: &SearchQuery,
    shard_prefix: &str,
    default_months_back: i32,
    now: DateTime<Utc>,
) -> Result<QueryPlan, ResolveError> {
    let text = search.query.trim();
    if text.is_empty() {
        return Err(ResolveError::invalid("query must not be blank"));
    }
    if search.size == 0 || search.size > MAX_PAGE_SIZE {
        return Err(ResolveError::invalid(format!(
            "size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, search.size
        )));
    }
    let sort_field: SortField = search.sort_by.parse().map_err(ResolveError::InvalidQuery)?;

    let mode = match search.mode {
        SearchMode::Auto => detect_mode(text),
        explicit => explicit,
    };

    let mut query = mode_query(mode, text);

    if let Some(domain) = search.filters.domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        query = query.and(Query::contains(fields::URL, domain));
    }

    let (from, to) = match (search.filters.from, search.filters.to) {
        (Some(from), Some(to)) if from > to => (Some(to), Some(from)),
        range => range,
    };
    if from.is_some() || to.is_some() {
        query = query.and(Query::range(
            fields::TIMESTAMP,
            from.map(|t| t.timestamp_millis()),
            to.map(|t| t.timestamp_millis()),
        ));
    }

    let shards = match (from, to) {
        (Some(from), to) => ShardSelection::Shards(shard_range(shard_prefix, from, to.unwrap_or(now))),
        (None, Some(_)) => ShardSelection::Pattern(wildcard_pattern(shard_prefix)),
        (None, None) => shard_set_at(
            shard_prefix,
            search.months_back.unwrap_or(default_months_back),
            now,
        ),
    };

    Ok(QueryPlan {
        mode,
        query,
        shards,
        page: PageRequest::new(search.page, search.size, SortSpec::new(sort_field, search.sort_direction)),
    })
}

/// Pick a mode from the shape of the text.
pub fn detect_mode(text: &str) -> SearchMode {
    if text.contains('*') || text.contains('?') {
        SearchMode::Wildcard
    } else if looks_like_email(text) {
        SearchMode::Exact
    } else if !text.contains(char::is_whitespace) && text.contains('.') {
        SearchMode::DomainOnly
    } else {
        SearchMode::Partial
    }
}

fn looks_like_email(text: &str) -> bool {
    if text.contains(char::is_whitespace) {
        return false;
    }
    match text.split_once('@') {
        Some((local, host)) => {
            !local.is_empty()
                && !host.contains('@')
                && host
                    .split_once('.')
                    .is_some_and(|(name, tld)| !name.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

fn mode_query(mode: SearchMode, text: &str) -> Query {
    match mode {
        SearchMode::Exact => Query::term(fields::LOGIN, text),
        SearchMode::Partial | SearchMode::Auto => {
            Query::contains(fields::LOGIN, text).or(Query::contains(fields::URL, text))
        }
        SearchMode::DomainOnly => Query::contains(fields::URL, text),
        SearchMode::UsernameOnly => Query::contains(fields::LOGIN, text),
        SearchMode::Wildcard => Query::wildcard(fields::URL, text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SortDirection;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
    }

    fn plan_for(search: &SearchQuery) -> Result<QueryPlan, ResolveError> {
        plan(search, "breaches", 0, now())
    }

    #[test]
    fn test_detect_mode() {
        assert_eq!(detect_mode("alice@example.com"), SearchMode::Exact);
        assert_eq!(detect_mode("example.com"), SearchMode::DomainOnly);
        assert_eq!(detect_mode("*.example.com/login"), SearchMode::Wildcard);
        assert_eq!(detect_mode("alice"), SearchMode::Partial);
        assert_eq!(detect_mode("alice smith"), SearchMode::Partial);
        assert_eq!(detect_mode("alice@localhost"), SearchMode::Partial);
    }

    #[test]
    fn test_exact_mode_builds_term() {
        let p = plan_for(&SearchQuery::new("  alice@example.com ")).unwrap();
        assert_eq!(p.mode, SearchMode::Exact);
        assert_eq!(p.query, Query::term("login", "alice@example.com"));
        assert_eq!(p.shards, ShardSelection::Pattern("breaches-*".into()));
    }

    #[test]
    fn test_partial_mode_is_or() {
        let p = plan_for(&SearchQuery::new("alice").with_mode(SearchMode::Partial)).unwrap();
        assert_eq!(
            p.query,
            Query::contains("login", "alice").or(Query::contains("url", "alice"))
        );
    }

    #[test]
    fn test_months_back_selects_shards() {
        let p = plan_for(&SearchQuery::new("alice").with_months_back(2)).unwrap();
        assert_eq!(
            p.shards,
            ShardSelection::Shards(vec!["breaches-2024-03".into(), "breaches-2024-02".into()])
        );

        let p = plan(&SearchQuery::new("alice"), "breaches", 1, now()).unwrap();
        assert_eq!(p.shards, ShardSelection::Shards(vec!["breaches-2024-03".into()]));
    }

    #[test]
    fn test_filters_compose() {
        let from = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let search = SearchQuery::new("alice")
            .with_mode(SearchMode::UsernameOnly)
            .with_domain_filter("corp.com")
            .with_date_range(Some(to), Some(from));

        let p = plan_for(&search).unwrap();
        assert_eq!(
            p.query,
            Query::contains("login", "alice")
                .and(Query::contains("url", "corp.com"))
                .and(Query::range("timestamp", Some(from.timestamp_millis()), Some(to.timestamp_millis())))
        );
        assert_eq!(
            p.shards,
            ShardSelection::Shards(vec!["breaches-2024-02".into(), "breaches-2024-01".into()])
        );
    }

    #[test]
    fn test_open_ended_ranges() {
        let from = Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap();
        let p = plan_for(&SearchQuery::new("alice").with_date_range(Some(from), None)).unwrap();
        assert_eq!(
            p.shards,
            ShardSelection::Shards(vec!["breaches-2024-03".into(), "breaches-2024-02".into()])
        );

        let p = plan_for(&SearchQuery::new("alice").with_date_range(None, Some(from))).unwrap();
        assert_eq!(p.shards, ShardSelection::Pattern("breaches-*".into()));
    }

    #[test]
    fn test_validation() {
        assert!(plan_for(&SearchQuery::new("   ")).unwrap_err().is_invalid_query());
        assert!(plan_for(&SearchQuery::new("a").with_page(0, 0)).is_err());
        assert!(plan_for(&SearchQuery::new("a").with_page(0, 101)).is_err());
        assert!(plan_for(&SearchQuery::new("a").with_sort("password", SortDirection::Asc)).is_err());
        assert!(plan_for(&SearchQuery::new("a").with_page(7, 100)).is_ok());
    }

    #[test]
    fn test_page_request() {
        let p = plan_for(&SearchQuery::new("a").with_page(2, 10).with_sort("login", SortDirection::Asc)).unwrap();
        assert_eq!(p.page, PageRequest::new(2, 10, SortSpec::new(SortField::Login, SortDirection::Asc)));
    }
}
