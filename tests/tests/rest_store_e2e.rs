//! Ingest, raw log, rebuild and stats against the REST backend.
//!
//! Needs Docker, or a disposable store in `TALLY_TEST_KV_URL` /
//! `TALLY_TEST_KV_TOKEN`. Run with `cargo test -p integration-tests
//! --test rest_store_e2e -- --ignored`.

use engine_core::{RetentionPolicy, UniqueSource};
use integration_tests::{
    fixtures::{self, FIXED_DAY},
    setup::RestContext,
};
use kv_store::{raw_log, Command, KvStore, Reply};
use worker::{collect_stats, RebuildEngine, RebuildOptions};

const DAY_OPENS: &str = "telemetry:day:2023-11-14:event:open";

async fn ingest_lyon(ctx: &RestContext, events: Vec<serde_json::Value>) {
    ctx.server
        .post("/telemetry")
        .add_header("x-vercel-ip-city", "Lyon")
        .add_header("x-vercel-ip-country", "FR")
        .json(&fixtures::batch_payload(events))
        .await
        .assert_status_ok();
}

#[tokio::test]
#[ignore = "needs Docker or TALLY_TEST_KV_URL"]
async fn test_rest_store_round_trip() {
    let ctx = RestContext::new().await;
    assert_eq!(ctx.store.backend(), "rest");

    ingest_lyon(&ctx, fixtures::open_events(3, "Canon")).await;
    assert_eq!(ctx.counter(DAY_OPENS).await, 3);

    // Raw log pages come back through XRANGE in order.
    let records = raw_log::read_day(ctx.store.as_ref(), FIXED_DAY, 2)
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].anon_id, "anon-0");
    assert_eq!(records[2].city, "Lyon");

    // Drift, then rebuild with a reset of the day namespace.
    ctx.store
        .pipeline(vec![
            Command::set(DAY_OPENS, 99),
            Command::set("telemetry:day:2023-11-14:city:Nowhere:event:open", 5),
        ])
        .await
        .unwrap();
    let engine = RebuildEngine::new(ctx.store.clone(), RetentionPolicy::default());
    let options = RebuildOptions::new(vec![FIXED_DAY.to_string()])
        .apply(true)
        .reset_day_keys(true)
        .page_size(100);
    let report = engine.run(&options).await;
    assert!(report.is_ok(), "{:?}", report.failed_days());
    assert_eq!(report.summaries[0].raw_events, 3);
    assert!(report.summaries[0].deleted_day_keys > 0);
    assert_eq!(ctx.counter(DAY_OPENS).await, 3);
    assert_eq!(
        ctx.counter("telemetry:day:2023-11-14:city:Nowhere:event:open")
            .await,
        0
    );

    let stats = collect_stats(ctx.store.as_ref(), vec![FIXED_DAY.to_string()])
        .await
        .unwrap();
    assert_eq!(stats.city_totals["Lyon"], 3);
    assert_eq!(stats.brand_totals["Canon"], 3);
    assert_eq!(stats.global_unique_total.value, 3);
    assert_eq!(stats.global_unique_total.source, UniqueSource::Exact);
    assert_eq!(stats.city_unique_totals["Lyon"].value, 3);
    assert!(stats.warnings.is_empty());
}

/// A duplicate id is deduped by the real SET NX marker.
#[tokio::test]
#[ignore = "needs Docker or TALLY_TEST_KV_URL"]
async fn test_rest_store_dedupe() {
    let ctx = RestContext::new().await;
    let event = fixtures::open_event_with_id("evt-rest", "anon-1");

    ctx.server
        .post("/telemetry")
        .json(&event)
        .await
        .assert_status_ok();
    let body: serde_json::Value = ctx.server.post("/telemetry").json(&event).await.json();

    assert_eq!(body["deduped"], true);
    assert_eq!(ctx.counter(DAY_OPENS).await, 1);
}

/// Per-command errors come back in the reply envelope without failing the
/// rest of the pipeline or the transaction.
#[tokio::test]
#[ignore = "needs Docker or TALLY_TEST_KV_URL"]
async fn test_rest_store_error_envelopes() {
    let ctx = RestContext::new().await;
    let key = "telemetry:day:2023-11-14:unique:all";

    let replies = ctx
        .store
        .pipeline(vec![
            Command::sadd(key, vec!["u1".into()]),
            Command::incr(key),
            Command::scard(key),
        ])
        .await
        .unwrap();
    assert_eq!(replies[0], Reply::Int(1));
    assert!(replies[1].is_error());
    assert_eq!(replies[2], Reply::Int(1));

    let replies = ctx
        .store
        .transaction(vec![Command::incr(key), Command::incr(DAY_OPENS)])
        .await
        .unwrap();
    assert!(replies[0].is_error());
    assert_eq!(replies[1], Reply::Int(1));
}
