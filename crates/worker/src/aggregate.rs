//! Pure recomputation of one day's aggregates from its raw records.

use std::collections::{BTreeMap, BTreeSet};

use engine_core::event::OPEN_EVENT;
use engine_core::keys;
use engine_core::{RawEventRecord, RetentionPolicy};
use kv_store::Command;

/// Every day-scoped counter and unique set of one day, keyed by store key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayAggregates {
    pub opens: BTreeMap<String, u64>,
    pub unique: BTreeMap<String, BTreeSet<String>>,
}

impl DayAggregates {
    /// Fold `records` into the aggregates of `day`.
    ///
    /// Records that are not opens, carry an unusable `ts`, fall on another
    /// day or lack an `anon_id` are skipped. Record order does not matter.
    pub fn from_records<'a, I>(day: &str, records: I) -> Self
    where
        I: IntoIterator<Item = &'a RawEventRecord>,
    {
        records.into_iter().fold(Self::default(), |mut acc, record| {
            acc.add(day, record);
            acc
        })
    }

    fn add(&mut self, day: &str, record: &RawEventRecord) {
        if record.event.trim() != OPEN_EVENT {
            return;
        }
        let Some(time) = record.event_time() else {
            return;
        };
        if time.day != day {
            return;
        }
        let anon_id = record.anon_id.trim();
        if anon_id.is_empty() {
            return;
        }

        let values = record.dimension_values(&time.hour);
        for key in keys::day_counter_keys(day, &values) {
            *self.opens.entry(key).or_default() += 1;
        }
        for key in keys::day_unique_keys(day, &values) {
            self.unique
                .entry(key)
                .or_default()
                .insert(anon_id.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.opens.is_empty() && self.unique.is_empty()
    }

    /// Events counted, read from the day total counter.
    pub fn total_opens(&self, day: &str) -> u64 {
        let key = keys::counter_key(&keys::day_namespace(day), "");
        self.opens.get(&key).copied().unwrap_or(0)
    }

    /// SET+EXPIRE per counter, SADD (plus EXPIRE when unique sets expire)
    /// per unique set. Counters are absolute values, never increments.
    pub fn write_commands(&self, retention: &RetentionPolicy) -> Vec<Command> {
        let counter_ttl = retention.counter_ttl_secs();
        let unique_ttl = retention.unique_ttl_secs();
        let mut commands = Vec::with_capacity(self.opens.len() * 2 + self.unique.len() * 2);

        for (key, count) in &self.opens {
            commands.push(Command::set(key.clone(), count));
            commands.push(Command::expire(key.clone(), counter_ttl));
        }

        for (key, members) in &self.unique {
            if members.is_empty() {
                continue;
            }
            commands.push(Command::sadd(key.clone(), members.iter().cloned().collect()));
            if let Some(ttl) = unique_ttl {
                commands.push(Command::expire(key.clone(), ttl));
            }
        }

        commands
    }
}
