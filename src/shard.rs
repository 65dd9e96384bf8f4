// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Time-sharded index naming.
//!
//! Every calendar month gets its own index shard named `<prefix>-<YYYY-MM>`.
//! Names are a pure function of `(prefix, instant)`, so historical shards stay
//! addressable across restarts and deployments.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use exposure_engine::shard::{shard_name, shard_set_at, wildcard_pattern, ShardSelection};
//!
//! let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
//! assert_eq!(shard_name("breaches", now), "breaches-2024-03");
//!
//! assert_eq!(
//!     shard_set_at("breaches", 3, now),
//!     ShardSelection::Shards(vec![
//!         "breaches-2024-03".into(),
//!         "breaches-2024-02".into(),
//!         "breaches-2024-01".into(),
//!     ])
//! );
//!
//! // Zero (or negative) lookback means "search everything"
//! assert_eq!(shard_set_at("breaches", 0, now), ShardSelection::Pattern(wildcard_pattern("breaches")));
//! ```

use chrono::{DateTime, Datelike, Utc};

use crate::search::glob_match;

/// Which shards a query should target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardSelection {
    /// Explicit shard names, most recent first
    Shards(Vec<String>),
    /// Glob over every shard ever created (e.g. `breaches-*`)
    Pattern(String),
}

impl ShardSelection {
    /// Whether `shard` is targeted by this selection.
    pub fn contains(&self, shard: &str) -> bool {
        match self {
            Self::Shards(names) => names.iter().any(|n| n == shard),
            Self::Pattern(pattern) => glob_match(pattern, shard),
        }
    }

    /// Human-readable form for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Shards(names) => names.join(","),
            Self::Pattern(pattern) => pattern.clone(),
        }
    }
}

/// Shard holding documents observed at `time`.
pub fn shard_name(prefix: &str, time: DateTime<Utc>) -> String {
    format_shard(prefix, time.year(), time.month())
}

/// Pattern matching every shard under `prefix`.
pub fn wildcard_pattern(prefix: &str) -> String {
    format!("{}-*", prefix)
}

/// Shards covering the last `months_back` months as of now.
pub fn shard_set(prefix: &str, months_back: i32) -> ShardSelection {
    shard_set_at(prefix, months_back, Utc::now())
}

/// Shards covering `months_back` months ending at `now`, most recent first.
///
/// `months_back <= 0` yields the wildcard pattern rather than an empty set.
pub fn shard_set_at(prefix: &str, months_back: i32, now: DateTime<Utc>) -> ShardSelection {
    if months_back <= 0 {
        return ShardSelection::Pattern(wildcard_pattern(prefix));
    }

    let current = month_index(now);
    let names = (0..months_back as i64)
        .map(|offset| {
            let (year, month) = from_month_index(current - offset);
            format_shard(prefix, year, month)
        })
        .collect();
    ShardSelection::Shards(names)
}

/// Every month shard between `from` and `to` inclusive, most recent first.
///
/// Argument order does not matter.
pub fn shard_range(prefix: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<String> {
    let (start, end) = if from <= to { (from, to) } else { (to, from) };
    let first = month_index(start);
    let last = month_index(end);
    (first..=last)
        .rev()
        .map(|idx| {
            let (year, month) = from_month_index(idx);
            format_shard(prefix, year, month)
        })
        .collect()
}

fn format_shard(prefix: &str, year: i32, month: u32) -> String {
    format!("{}-{:04}-{:02}", prefix, year, month)
}

// Months since year 0; stepping on this avoids day-of-month clamping.
fn month_index(time: DateTime<Utc>) -> i64 {
    time.year() as i64 * 12 + (time.month0() as i64)
}

fn from_month_index(idx: i64) -> (i32, u32) {
    (idx.div_euclid(12) as i32, (idx.rem_euclid(12) + 1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_shard_name_format() {
        assert_eq!(shard_name("breaches", at(2024, 3, 15)), "breaches-2024-03");
        assert_eq!(shard_name("breaches", at(2024, 12, 31)), "breaches-2024-12");
        assert_eq!(shard_name("leaks", at(999, 1, 1)), "leaks-0999-01");
    }

    #[test]
    fn test_shard_set_three_months() {
        let set = shard_set_at("breaches", 3, at(2024, 3, 15));
        assert_eq!(
            set,
            ShardSelection::Shards(vec![
                "breaches-2024-03".to_string(),
                "breaches-2024-02".to_string(),
                "breaches-2024-01".to_string(),
            ])
        );
    }

    #[test]
    fn test_shard_set_crosses_year_boundary() {
        let set = shard_set_at("breaches", 3, at(2024, 1, 31));
        assert_eq!(
            set,
            ShardSelection::Shards(vec![
                "breaches-2024-01".to_string(),
                "breaches-2023-12".to_string(),
                "breaches-2023-11".to_string(),
            ])
        );
    }

    #[test]
    fn test_month_end_does_not_skip_february() {
        // Naive "minus one month" from Mar 31 lands in March again; month indexing doesn't.
        let set = shard_set_at("b", 2, at(2024, 3, 31));
        assert_eq!(set, ShardSelection::Shards(vec!["b-2024-03".into(), "b-2024-02".into()]));
    }

    #[test]
    fn test_non_positive_lookback_is_wildcard() {
        let now = at(2024, 3, 15);
        assert_eq!(shard_set_at("breaches", 0, now), ShardSelection::Pattern("breaches-*".into()));
        assert_eq!(shard_set_at("breaches", -5, now), ShardSelection::Pattern("breaches-*".into()));
    }

    #[test]
    fn test_distinct_months_never_collide() {
        let mut seen = std::collections::HashSet::new();
        for year in 2000..2030 {
            for month in 1..=12 {
                assert!(seen.insert(shard_name("b", at(year, month, 1))));
            }
        }
    }

    #[test]
    fn test_shard_range() {
        let names = shard_range("breaches", at(2023, 11, 20), at(2024, 2, 3));
        assert_eq!(
            names,
            vec!["breaches-2024-02", "breaches-2024-01", "breaches-2023-12", "breaches-2023-11"]
        );
        // Swapped arguments give the same answer
        assert_eq!(shard_range("breaches", at(2024, 2, 3), at(2023, 11, 20)), names);
        // Same month
        assert_eq!(shard_range("breaches", at(2024, 2, 1), at(2024, 2, 28)), vec!["breaches-2024-02"]);
    }

    #[test]
    fn test_selection_contains() {
        let pattern = ShardSelection::Pattern(wildcard_pattern("breaches"));
        assert!(pattern.contains("breaches-2019-07"));
        assert!(!pattern.contains("other-2019-07"));

        let explicit = ShardSelection::Shards(vec!["breaches-2024-03".into()]);
        assert!(explicit.contains("breaches-2024-03"));
        assert!(!explicit.contains("breaches-2024-02"));
        assert_eq!(explicit.describe(), "breaches-2024-03");
    }
}
