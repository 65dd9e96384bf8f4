// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic exposure-engine usage example.
//!
//! Demonstrates, over the in-memory stores (no Docker required):
//! 1. Ingesting breach records into the source store
//! 2. A search answered by the index, with canonical values winning over a stale index copy
//! 3. A search the index misses, answered by the source store and then repaired
//! 4. Plan-tier masking
//! 5. Index outage: same answers, degraded health
//! 6. Displaying metrics
//! 7. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```
//!
//! Against real backends, swap `ExposureEngine::new` for
//! `ExposureEngine::connect` with `redis_url` and `sql_url` set.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use exposure_engine::storage::memory::{InMemoryIndex, InMemorySourceStore};
use exposure_engine::{
    shard_name, CallerContext, CanonicalRecord, ExposureEngine, ExposureEngineConfig, PlanTier, ResolvedResult,
    SearchMode, SearchQuery,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║          exposure-engine: Basic Usage Example                 ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Wire the engine over in-memory stores
    // ─────────────────────────────────────────────────────────────────────────
    let index = Arc::new(InMemoryIndex::new());
    let source = Arc::new(InMemorySourceStore::new());
    let config = ExposureEngineConfig {
        index_timeout_ms: 100,
        repair_base_delay_ms: 20,
        ..Default::default()
    };
    let engine = ExposureEngine::new(config, index.clone(), source.clone());
    println!("📦 Engine ready (shard prefix '{}')", engine.config().shard_prefix);

    let march = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
    let records = vec![
        CanonicalRecord::new("alice@example.com", "hunter22", "https://www.example.com/login").with_timestamp(march),
        CanonicalRecord::new("bob@example.com", "letmein99", "https://mail.example.com").with_timestamp(march),
        CanonicalRecord::new("carol@corp.io", "Spring2024!", "https://sso.corp.io/auth")
            .with_timestamp(Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap())
            .with_source_tag("combolist-7"),
    ];

    println!("\n📝 Ingesting {} records...", records.len());
    for record in &records {
        let outcome = engine.ingest(record.clone()).await?;
        println!("   └─ {} → {:?} (shard {})", record.login, outcome, shard_name("breaches", record.shard_time()));
    }
    engine.repairer().wait_idle().await;
    println!("   ✅ Indexed {} documents across {:?}", index.doc_count(), index.shard_names());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Index answer; the source store wins on values
    // ─────────────────────────────────────────────────────────────────────────
    let mut changed = records[0].clone();
    changed.password = "hunter2-changed".into();
    source.insert(changed);

    let pro = CallerContext::new(PlanTier::Professional).with_caller_id("demo");
    let outcome = engine
        .resolve_detailed(&SearchQuery::new("alice@example.com"), &pro)
        .await?;
    println!("\n🔍 alice@example.com (index holds a stale password)");
    print_results(&outcome.results);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Source-only record: fallback, then read repair
    // ─────────────────────────────────────────────────────────────────────────
    source.insert(CanonicalRecord::new("dave@corp.io", "qwerty123", "https://vpn.corp.io").with_timestamp(march));

    let query = SearchQuery::new("dave").with_mode(SearchMode::UsernameOnly);
    let first = engine.resolve_detailed(&query, &pro).await?;
    println!("\n🔍 dave before repair (answered by {})", first.source);
    print_results(&first.results);

    engine.repairer().wait_idle().await;
    let second = engine.resolve_detailed(&query, &pro).await?;
    println!("🔍 dave after repair (answered by {})", second.source);
    print_results(&second.results);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Masking per plan tier
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔐 Same search, Free tier:");
    let free = engine
        .resolve(&SearchQuery::new("bob@example.com"), &CallerContext::new(PlanTier::Free))
        .await?;
    print_results(&free);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Index outage
    // ─────────────────────────────────────────────────────────────────────────
    index.set_failing(true);
    let degraded = engine
        .resolve_detailed(&SearchQuery::new("bob@example.com"), &pro)
        .await?;
    let health = engine.health().await;
    println!("\n⚠️  Index down: answered by {}, healthy={}", degraded.source, health.index_healthy);
    println!("   └─ last error: {}", health.index_last_error.as_deref().unwrap_or("-"));
    index.set_failing(false);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    engine.shutdown().await;
    let stats = engine.repairer().stats();
    println!(
        "\n🛠️  Repairs: scheduled={} succeeded={} dropped={} overflowed={}",
        stats.scheduled, stats.succeeded, stats.dropped, stats.overflowed
    );

    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

fn print_results(results: &[ResolvedResult]) {
    if results.is_empty() {
        println!("   └─ (no results)");
    }
    for r in results {
        println!(
            "   └─ {:<20} {:<16} {:<28} masked={} via {}",
            r.login, r.password, r.url, r.masking_applied, r.source_store
        );
    }
}

/// Print counters and gauges, then a one-line summary per histogram
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<String> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let name = if labels.is_empty() {
                key.name().to_string()
            } else {
                format!("{}{{{}}}", key.name(), labels.join(","))
            };
            match value {
                DebugValue::Counter(v) => format!("{} = {}", name, v),
                DebugValue::Gauge(v) => format!("{} = {:.2}", name, v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("{} count={} sum={:.4}", name, samples.len(), sum)
                }
            }
        })
        .collect();

    lines.sort();
    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
