//! Ingestion: dedupe marker first, then one atomic fan-out batch.

use chrono::Utc;
use engine_core::keys;
use engine_core::{Error, NormalizedEvent, Result, RetentionPolicy};
use kv_store::{check_replies, Command, SharedStore};
use serde::Serialize;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, error};

use crate::fanout;

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Processed,
    Deduped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub index: usize,
    pub event_id: String,
    pub day: String,
    #[serde(skip)]
    pub hour: String,
    pub status: IngestStatus,
}

impl IngestOutcome {
    pub fn deduped(&self) -> bool {
        self.status == IngestStatus::Deduped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub items: Vec<IngestOutcome>,
}

impl BatchOutcome {
    pub fn processed(&self) -> usize {
        self.items.iter().filter(|i| !i.deduped()).count()
    }

    pub fn deduped(&self) -> usize {
        self.items.iter().filter(|i| i.deduped()).count()
    }
}

/// Applies validated events to the store.
pub struct IngestProcessor {
    store: SharedStore,
    retention: RetentionPolicy,
}

impl IngestProcessor {
    pub fn new(store: SharedStore, retention: RetentionPolicy) -> Self {
        Self { store, retention }
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Process one event. Winning the dedupe marker is the commit point and
    /// the marker stays whatever happens to the fan-out. After a partial batch
    /// failure the raw record is in the log and a rebuild of the day restores
    /// the aggregates; a batch that never ran leaves nothing to rebuild from.
    pub async fn process(&self, index: usize, event: &NormalizedEvent) -> Result<IngestOutcome> {
        let started = Instant::now();
        let outcome = |status| IngestOutcome {
            index,
            event_id: event.event_id.clone(),
            day: event.time.day.clone(),
            hour: event.time.hour.clone(),
            status,
        };

        let marker = keys::dedupe_key(&event.time.day, &event.event_id);
        let reply = self
            .store
            .execute(Command::set_nx_ex(marker, "1", self.retention.dedupe_ttl_secs()))
            .await
            .map_err(|e| {
                metrics().store_errors.inc();
                e
            })?;

        if reply.is_nil() {
            metrics().events_deduped.inc();
            debug!(event_id = %event.event_id, day = %event.time.day, "Duplicate event skipped");
            return Ok(outcome(IngestStatus::Deduped));
        }

        let commands = fanout::plan(event, Utc::now(), &self.retention);
        let replies = self.store.transaction(commands).await.map_err(|e| {
            metrics().store_errors.inc();
            e
        })?;
        if let Err(e) = check_replies(&replies, "fan-out failed") {
            metrics().store_errors.inc();
            error!(
                event_id = %event.event_id,
                day = %event.time.day,
                error = %e,
                "Partial batch failure; rebuild the day to repair aggregates"
            );
            return Err(e);
        }

        metrics().events_processed.inc();
        metrics()
            .ingest_latency_ms
            .observe(started.elapsed().as_millis() as u64);
        Ok(outcome(IngestStatus::Processed))
    }

    /// Process events in order. Stops at the first storage failure; events
    /// already processed stay processed and are deduped on retry.
    pub async fn process_batch(&self, events: &[NormalizedEvent]) -> Result<BatchOutcome> {
        let mut items = Vec::with_capacity(events.len());
        for (index, event) in events.iter().enumerate() {
            let item = self.process(index, event).await.map_err(|e| match e {
                Error::Storage(message) => {
                    Error::storage(format!("event[{}]: {}", index, message))
                }
                other => other,
            })?;
            items.push(item);
        }
        Ok(BatchOutcome { items })
    }
}
