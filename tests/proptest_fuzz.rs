// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests (fuzzing) for the pure parts of the engine.
//!
//! Uses proptest to generate random/malformed inputs and verify masking,
//! shard naming, record identity and query translation never panic and
//! keep their invariants.
//!
//! Run with: `cargo test --test proptest_fuzz`

use chrono::{DateTime, Datelike, TimeZone, Utc};
use proptest::prelude::*;

use exposure_engine::record::{derive_domain, record_id};
use exposure_engine::resolver::{detect_mode, plan};
use exposure_engine::search::{matches, glob_match, Query, RediSearchTranslator, SqlTranslator};
use exposure_engine::shard::{shard_range, shard_set_at};
use exposure_engine::{mask_password, shard_name, CanonicalRecord, SearchQuery, ShardSelection};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Instants between 1970 and 2100
fn instant_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800).prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
}

/// Shard prefixes as deployed
fn prefix_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Arbitrary query ASTs, including hostile text
fn query_strategy() -> impl Strategy<Value = Query> {
    let field = prop_oneof![
        Just("login"),
        Just("password"),
        Just("url"),
        Just("domain"),
        Just("timestamp"),
        Just("no_such_field"),
    ];
    let leaf = prop_oneof![
        Just(Query::match_all()),
        (field.clone(), ".*").prop_map(|(f, v)| Query::term(f, v)),
        (field.clone(), ".*").prop_map(|(f, v)| Query::contains(f, v)),
        (field.clone(), ".*").prop_map(|(f, v)| Query::prefix(f, v)),
        (field.clone(), ".*").prop_map(|(f, v)| Query::wildcard(f, v)),
        (field, any::<Option<i64>>(), any::<Option<i64>>()).prop_map(|(f, lo, hi)| Query::range(f, lo, hi)),
    ];

    leaf.prop_recursive(
        4,  // depth
        32, // max nodes
        4,  // items per collection
        |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| a.and(b)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| a.or(b)),
                inner.prop_map(Query::negate),
            ]
        },
    )
}

// =============================================================================
// Masking
// =============================================================================

proptest! {
    #[test]
    fn mask_keeps_edges_and_length(password in "\\PC{5,64}") {
        let masked = mask_password(&password);
        let original: Vec<char> = password.chars().collect();
        let out: Vec<char> = masked.chars().collect();

        prop_assert_eq!(out.len(), original.len());
        prop_assert_eq!(&out[..2], &original[..2]);
        prop_assert_eq!(&out[out.len() - 2..], &original[original.len() - 2..]);
        prop_assert!(out[2..out.len() - 2].iter().all(|c| *c == '*'));
    }

    #[test]
    fn mask_short_passwords_reveal_nothing(password in "\\PC{1,4}") {
        let masked = mask_password(&password);
        prop_assert!(masked.chars().all(|c| c == '*'));
        prop_assert!(masked.chars().count() >= 4);
    }

    #[test]
    fn mask_never_panics(password in ".*") {
        let _ = mask_password(&password);
    }
}

// =============================================================================
// Shard naming
// =============================================================================

proptest! {
    #[test]
    fn shard_name_is_prefix_year_month(prefix in prefix_strategy(), t in instant_strategy()) {
        let name = shard_name(&prefix, t);
        prop_assert_eq!(name.clone(), format!("{}-{:04}-{:02}", prefix, t.year(), t.month()));
        prop_assert_eq!(name, shard_name(&prefix, t));
    }

    #[test]
    fn distinct_months_never_collide(a in instant_strategy(), b in instant_strategy()) {
        let same_month = (a.year(), a.month()) == (b.year(), b.month());
        prop_assert_eq!(shard_name("breaches", a) == shard_name("breaches", b), same_month);
    }

    #[test]
    fn shard_set_has_one_shard_per_month(months in 1i32..240, now in instant_strategy()) {
        let ShardSelection::Shards(names) = shard_set_at("breaches", months, now) else {
            return Err(TestCaseError::fail("expected explicit shards"));
        };
        prop_assert_eq!(names.len(), months as usize);
        prop_assert_eq!(&names[0], &shard_name("breaches", now));

        let mut sorted = names.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();
        prop_assert_eq!(sorted, names);
    }

    #[test]
    fn non_positive_lookback_is_wildcard(months in -1000i32..=0, now in instant_strategy()) {
        prop_assert_eq!(
            shard_set_at("breaches", months, now),
            ShardSelection::Pattern("breaches-*".to_string())
        );
    }

    #[test]
    fn shard_range_covers_both_ends(a in instant_strategy(), b in instant_strategy()) {
        let names = shard_range("breaches", a, b);
        prop_assert!(names.contains(&shard_name("breaches", a)));
        prop_assert!(names.contains(&shard_name("breaches", b)));
        prop_assert_eq!(names, shard_range("breaches", b, a));
    }

    #[test]
    fn every_shard_matches_its_wildcard(t in instant_strategy()) {
        prop_assert!(glob_match("breaches-*", &shard_name("breaches", t)));
    }
}

// =============================================================================
// Record identity
// =============================================================================

proptest! {
    #[test]
    fn record_id_is_deterministic_hex(login in ".*", password in ".*", url in ".*") {
        let id = record_id(&login, &password, &url);
        prop_assert_eq!(id.len(), 64);
        prop_assert!(id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        prop_assert_eq!(id, record_id(&login, &password, &url));
    }

    #[test]
    fn record_id_depends_on_password(login in "[a-z]{1,8}", a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
        prop_assume!(a != b);
        prop_assert_ne!(record_id(&login, &a, "https://x.com"), record_id(&login, &b, "https://x.com"));
    }

    #[test]
    fn derive_domain_never_panics_and_is_lowercase(url in ".*") {
        let domain = derive_domain(&url);
        prop_assert_eq!(domain.clone(), domain.to_lowercase());
    }
}

// =============================================================================
// Query planning and translation
// =============================================================================

proptest! {
    #[test]
    fn translators_never_panic(query in query_strategy()) {
        let _ = RediSearchTranslator::translate(&query);
        let sql = SqlTranslator::translate(&query);
        prop_assert_eq!(sql.clause.matches('?').count(), sql.params.len());
    }

    #[test]
    fn matcher_never_panics(query in query_strategy(), login in ".*", password in ".*") {
        let record = CanonicalRecord::new(login, password, "https://example.com");
        let _ = matches(&query, &record);
        let _ = matches(&query, &record.to_index_document());
    }

    #[test]
    fn redis_escaping_contains_no_bare_specials(text in "[a-zA-Z0-9@.\\-:{}|()]{1,32}") {
        let translated = RediSearchTranslator::translate(&Query::term("password", text.clone()));
        // Every special char from the input appears escaped
        for c in text.chars().filter(|c| !c.is_alphanumeric()) {
            let escaped = format!("\\{}", c);
            prop_assert!(translated.contains(&escaped), "{} not escaped in {}", c, translated);
        }
    }

    #[test]
    fn planning_never_panics(text in ".*", size in 0u32..200, page in 0u32..1000, months in -5i32..36) {
        let search = SearchQuery::new(text.clone()).with_page(page, size).with_months_back(months);
        let _ = detect_mode(&text);
        let _ = plan(&search, "breaches", 0, Utc::now());
    }
}
