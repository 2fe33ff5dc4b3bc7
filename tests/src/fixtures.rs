//! Test fixtures and event generators.

use serde_json::{json, Value};
use uuid::Uuid;

/// 2023-11-14T22:13:20Z
pub const FIXED_TS: i64 = 1_700_000_000;
pub const FIXED_DAY: &str = "2023-11-14";
pub const FIXED_HOUR: usize = 22;

pub const REBUILD_TOKEN: &str = "rebuild-secret";
pub const MIGRATE_TOKEN: &str = "migrate-secret";
pub const CRON_TOKEN: &str = "cron-secret";

/// An open event on the fixed day with a random event id.
pub fn open_event(anon_id: &str, brand: &str) -> Value {
    json!({
        "event": "open",
        "event_id": Uuid::new_v4().to_string(),
        "anon_id": anon_id,
        "ts": FIXED_TS,
        "camera_brand": brand,
        "camera_model": "R5",
        "language": "fr",
        "app_version": "2.4.1",
        "os": "ios",
    })
}

/// An open event with an explicit id, for dedupe tests.
pub fn open_event_with_id(event_id: &str, anon_id: &str) -> Value {
    let mut event = open_event(anon_id, "Canon");
    event["event_id"] = Value::String(event_id.to_string());
    event
}

/// `{ "events": [...] }`
pub fn batch_payload(events: Vec<Value>) -> Value {
    json!({ "events": events })
}

/// N distinct opens, one per visitor.
pub fn open_events(n: usize, brand: &str) -> Vec<Value> {
    (0..n)
        .map(|i| open_event(&format!("anon-{}", i), brand))
        .collect()
}

/// A batch above the event cap.
pub fn oversized_batch() -> Value {
    batch_payload(open_events(1001, "Canon"))
}

/// A body above the byte cap.
pub fn oversized_body() -> String {
    let mut event = open_event("anon-big", "Canon");
    event["padding"] = Value::String("x".repeat(1_100_000));
    event.to_string()
}
