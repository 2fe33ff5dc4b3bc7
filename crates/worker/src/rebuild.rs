//! Deterministic rebuild of day aggregates from the raw event log.

use std::time::Instant;

use engine_core::keys;
use engine_core::limits::{
    DEFAULT_REBUILD_PAGE_SIZE, DELETE_CHUNK, MAX_REBUILD_PAGE_SIZE, MIN_REBUILD_PAGE_SIZE,
    REBUILD_LOCK_TTL_SECS, REBUILD_WRITE_CHUNK,
};
use engine_core::{Error, Result, RetentionPolicy};
use kv_store::{ops, raw_log, SharedStore};
use serde::Serialize;
use telemetry::metrics;
use tracing::{error, info, warn};

use crate::aggregate::DayAggregates;

/// What to rebuild and how.
#[derive(Debug, Clone)]
pub struct RebuildOptions {
    pub days: Vec<String>,
    /// Write results; otherwise only report what would be written.
    pub apply: bool,
    /// Delete every key of the day before writing.
    pub reset_day_keys: bool,
    pub page_size: usize,
    pub write_chunk: usize,
}

impl RebuildOptions {
    pub fn new(days: Vec<String>) -> Self {
        Self {
            days,
            apply: false,
            reset_day_keys: false,
            page_size: DEFAULT_REBUILD_PAGE_SIZE,
            write_chunk: REBUILD_WRITE_CHUNK,
        }
    }

    pub fn apply(mut self, apply: bool) -> Self {
        self.apply = apply;
        self
    }

    pub fn reset_day_keys(mut self, reset: bool) -> Self {
        self.reset_day_keys = reset;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(MIN_REBUILD_PAGE_SIZE, MAX_REBUILD_PAGE_SIZE);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub day: String,
    pub stream_key: String,
    pub raw_events: usize,
    pub opens_keys: usize,
    pub unique_keys: usize,
    pub applied: bool,
    pub deleted_day_keys: u64,
    pub writes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub days: Vec<String>,
    pub summaries: Vec<DaySummary>,
}

impl RebuildReport {
    /// True when no day failed.
    pub fn is_ok(&self) -> bool {
        self.summaries.iter().all(|s| s.error.is_none())
    }

    pub fn failed_days(&self) -> Vec<&str> {
        self.summaries
            .iter()
            .filter(|s| s.error.is_some())
            .map(|s| s.day.as_str())
            .collect()
    }
}

/// Replays raw logs into day-scoped counters and unique sets.
pub struct RebuildEngine {
    store: SharedStore,
    retention: RetentionPolicy,
}

impl RebuildEngine {
    pub fn new(store: SharedStore, retention: RetentionPolicy) -> Self {
        Self { store, retention }
    }

    /// Rebuild each day independently. A failing day gets an `error` in its
    /// summary and the remaining days still run.
    pub async fn run(&self, options: &RebuildOptions) -> RebuildReport {
        metrics().rebuild_runs.inc();
        let mut summaries = Vec::with_capacity(options.days.len());

        for day in &options.days {
            let started = Instant::now();
            let mut summary = DaySummary {
                day: day.clone(),
                stream_key: keys::raw_log_key(day),
                ..Default::default()
            };

            match self.rebuild_day(day, options, &mut summary).await {
                Ok(()) => {
                    if summary.applied {
                        metrics().rebuild_days_applied.inc();
                    }
                    info!(
                        day = %day,
                        raw_events = summary.raw_events,
                        opens_keys = summary.opens_keys,
                        unique_keys = summary.unique_keys,
                        applied = summary.applied,
                        deleted = summary.deleted_day_keys,
                        writes = summary.writes,
                        "Day rebuilt"
                    );
                }
                Err(e) => {
                    metrics().rebuild_day_failures.inc();
                    error!(day = %day, error = %e, "Day rebuild failed");
                    summary.error = Some(day_error(&e));
                }
            }

            metrics()
                .rebuild_latency_ms
                .observe(started.elapsed().as_millis() as u64);
            summaries.push(summary);
        }

        RebuildReport {
            days: options.days.clone(),
            summaries,
        }
    }

    async fn rebuild_day(
        &self,
        day: &str,
        options: &RebuildOptions,
        summary: &mut DaySummary,
    ) -> Result<()> {
        if !options.apply {
            self.fold_day(day, options.page_size, summary).await?;
            return Ok(());
        }

        let lock = keys::rebuild_lock_key(day);
        if !ops::acquire_lock(self.store.as_ref(), &lock, REBUILD_LOCK_TTL_SECS).await? {
            return Err(Error::conflict("rebuild already running"));
        }

        metrics().rebuild_in_progress.inc();
        let result = self.apply_day(day, options, summary).await;
        metrics().rebuild_in_progress.dec();

        if let Err(e) = ops::release_lock(self.store.as_ref(), &lock).await {
            warn!(day = %day, error = %e, "Failed to release rebuild lock; it expires on its own");
        }
        result
    }

    async fn fold_day(
        &self,
        day: &str,
        page_size: usize,
        summary: &mut DaySummary,
    ) -> Result<DayAggregates> {
        let records = raw_log::read_day(self.store.as_ref(), day, page_size).await?;
        metrics().rebuild_events_replayed.inc_by(records.len() as u64);

        let aggregates = DayAggregates::from_records(day, &records);
        summary.raw_events = records.len();
        summary.opens_keys = aggregates.opens.len();
        summary.unique_keys = aggregates.unique.len();
        Ok(aggregates)
    }

    async fn apply_day(
        &self,
        day: &str,
        options: &RebuildOptions,
        summary: &mut DaySummary,
    ) -> Result<()> {
        let aggregates = self.fold_day(day, options.page_size, summary).await?;
        let store = self.store.as_ref();

        if options.reset_day_keys {
            let existing = ops::scan_keys(store, &keys::day_namespace_pattern(day)).await?;
            summary.deleted_day_keys = ops::delete_keys(store, &existing, DELETE_CHUNK).await?;
        }

        summary.writes =
            ops::run_chunked(store, aggregates.write_commands(&self.retention), options.write_chunk)
                .await?;
        summary.applied = true;
        Ok(())
    }
}

/// Conflicts surface as their bare reason, everything else with its kind.
fn day_error(err: &Error) -> String {
    match err {
        Error::Conflict(reason) => reason.clone(),
        other => other.to_string(),
    }
}
