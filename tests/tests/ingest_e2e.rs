//! End-to-end tests for the ingest pipeline.
//!
//! POST /telemetry → validation → dedupe marker → atomic fan-out, checked
//! against the in-memory store.

use integration_tests::{
    fixtures::{self, FIXED_DAY},
    setup::TestContext,
};
use serde_json::Value;

const DAY_OPENS: &str = "telemetry:day:2023-11-14:event:open";

/// Single event: every aggregate and the raw log are written.
#[tokio::test]
async fn test_ingest_single_event_e2e() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/telemetry")
        .add_header("x-vercel-ip-city", "S%C3%A3o%20Paulo")
        .add_header("x-vercel-ip-country", "BR")
        .json(&fixtures::open_event("anon-1", "Canon"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["deduped"], false);
    assert_eq!(body["day"], FIXED_DAY);
    assert_eq!(body["hour"], "22");
    assert_eq!(body["city"], "São Paulo");
    assert_eq!(body["country"], "BR");
    assert_eq!(body["event"], "open");

    assert_eq!(ctx.counter(DAY_OPENS), 1);
    assert_eq!(
        ctx.counter("telemetry:day:2023-11-14:city:S%C3%A3o%20Paulo:brand:Canon:event:open"),
        1
    );
    assert_eq!(ctx.counter("telemetry:total:brand:Canon:event:open"), 1);
    assert!(ctx
        .store
        .members("telemetry:day:2023-11-14:unique:city:S%C3%A3o%20Paulo")
        .contains("anon-1"));
    assert_eq!(ctx.store.stream_len("telemetry:raw:day:2023-11-14"), 1);
}

/// Batch form: per-item outcomes in request order.
#[tokio::test]
async fn test_ingest_batch_e2e() {
    let ctx = TestContext::new();

    let payload = fixtures::batch_payload(fixtures::open_events(5, "Nikon"));
    let response = ctx.server.post("/telemetry").json(&payload).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["received"], 5);
    assert_eq!(body["processed"], 5);
    assert_eq!(body["deduped"], 0);

    let items = body["items"].as_array().expect("items array");
    assert_eq!(items.len(), 5);
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item["index"], i);
        assert_eq!(item["status"], "processed");
    }

    assert_eq!(ctx.counter(DAY_OPENS), 5);
    assert_eq!(ctx.counter("telemetry:total:event:open"), 5);
    assert_eq!(ctx.store.members("telemetry:day:2023-11-14:unique:all").len(), 5);
    assert_eq!(ctx.store.stream_len("telemetry:raw:day:2023-11-14"), 5);
}

/// A retried event id is acknowledged but counted once.
#[tokio::test]
async fn test_duplicate_event_counted_once() {
    let ctx = TestContext::new();
    let event = fixtures::open_event_with_id("evt-retry", "anon-1");

    ctx.server.post("/telemetry").json(&event).await.assert_status_ok();
    let response = ctx.server.post("/telemetry").json(&event).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["deduped"], true);
    assert_eq!(body["event_id"], "evt-retry");

    assert_eq!(ctx.counter(DAY_OPENS), 1);
    assert_eq!(ctx.store.stream_len("telemetry:raw:day:2023-11-14"), 1);
}

/// Without an event id the same open derives the same id.
#[tokio::test]
async fn test_derived_event_id_dedupes() {
    let ctx = TestContext::new();
    let mut event = fixtures::open_event("anon-7", "Sony");
    event.as_object_mut().unwrap().remove("event_id");

    let first: Value = ctx.server.post("/telemetry").json(&event).await.json();
    let second: Value = ctx.server.post("/telemetry").json(&event).await.json();

    assert_eq!(first["deduped"], false);
    assert_eq!(second["deduped"], true);
    assert_eq!(first["event_id"], second["event_id"]);
    assert_eq!(ctx.counter(DAY_OPENS), 1);
}

/// Duplicates inside one batch are reported per item.
#[tokio::test]
async fn test_batch_with_inner_duplicate() {
    let ctx = TestContext::new();
    let event = fixtures::open_event_with_id("evt-dup", "anon-1");
    let payload = fixtures::batch_payload(vec![
        event.clone(),
        fixtures::open_event("anon-2", "Canon"),
        event,
    ]);

    let body: Value = ctx.server.post("/telemetry").json(&payload).await.json();
    assert_eq!(body["received"], 3);
    assert_eq!(body["processed"], 2);
    assert_eq!(body["deduped"], 1);
    assert_eq!(body["items"][2]["status"], "deduped");
    assert_eq!(ctx.counter(DAY_OPENS), 2);
}

/// Client-supplied location fields are ignored.
#[tokio::test]
async fn test_client_location_is_ignored() {
    let ctx = TestContext::new();
    let mut event = fixtures::open_event("anon-1", "Canon");
    event["city"] = Value::String("Paris".into());
    event["country"] = Value::String("FR".into());

    let body: Value = ctx.server.post("/telemetry").json(&event).await.json();
    assert_eq!(body["city"], "Unknown");
    assert_eq!(body["country"], "Unknown");
    assert_eq!(
        ctx.counter("telemetry:day:2023-11-14:city:Unknown:event:open"),
        1
    );
}

/// Missing attributes land on their sentinels.
#[tokio::test]
async fn test_missing_attributes_use_sentinels() {
    let ctx = TestContext::new();
    let event = serde_json::json!({
        "event": "open",
        "event_id": "evt-bare",
        "anon_id": "anon-bare",
        "ts": fixtures::FIXED_TS * 1000,
    });

    let body: Value = ctx.server.post("/telemetry").json(&event).await.json();
    assert_eq!(body["day"], FIXED_DAY);
    assert_eq!(ctx.counter("telemetry:day:2023-11-14:brand:Other:event:open"), 1);
    assert!(ctx
        .store
        .members("telemetry:day:2023-11-14:unique:model:Unknown")
        .contains("anon-bare"));
}
