//! The write set of one newly accepted event.

use chrono::{DateTime, Utc};
use engine_core::keys::{self, DimensionValues};
use engine_core::{NormalizedEvent, RawEventRecord, RetentionPolicy};
use kv_store::raw_log;
use kv_store::Command;

/// Commands that apply one event to every aggregate and append it to the raw
/// log. Issued as a single atomic batch after the dedupe marker is won.
pub fn plan(
    event: &NormalizedEvent,
    ingested_at: DateTime<Utc>,
    retention: &RetentionPolicy,
) -> Vec<Command> {
    let day = &event.time.day;
    let values = DimensionValues::from_event(event);
    let counter_ttl = retention.counter_ttl_secs();
    let mut commands = Vec::with_capacity(48);

    for key in keys::day_counter_keys(day, &values) {
        commands.push(Command::incr(key.clone()));
        commands.push(Command::expire(key, counter_ttl));
    }

    for key in keys::total_counter_keys(&values) {
        commands.push(Command::incr(key));
    }

    let member = vec![event.anon_id.clone()];
    for key in keys::day_unique_keys(day, &values) {
        commands.push(Command::sadd(key.clone(), member.clone()));
        if let Some(ttl) = retention.unique_ttl_secs() {
            commands.push(Command::expire(key, ttl));
        }
    }

    for key in keys::total_unique_keys(&values) {
        commands.push(Command::sadd(key, member.clone()));
    }

    let week_key = keys::week_user_key(&event.time.week, &event.anon_id);
    commands.push(Command::incr(week_key.clone()));
    commands.push(Command::expire(week_key, retention.week_ttl_secs()));

    let record = RawEventRecord::from_event(event, ingested_at);
    commands.extend(raw_log::append_commands(day, &record, retention.raw_ttl_secs()));

    commands
}
