//! Background scheduler: store health probe and periodic day rebuild.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use engine_core::limits::DEFAULT_REBUILD_PAGE_SIZE;
use engine_core::DayScope;
use kv_store::{health::check_connection, SharedStore};
use serde::{Deserialize, Serialize};
use telemetry::health;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::rebuild::{RebuildEngine, RebuildOptions, RebuildReport};

/// Worker scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Run the periodic rebuild.
    pub rebuild_enabled: bool,
    pub rebuild_interval_secs: u64,
    /// Which day the periodic rebuild targets.
    pub rebuild_scope: DayScope,
    pub reset_day_keys: bool,
    pub page_size: usize,
    pub health_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            rebuild_enabled: false,
            rebuild_interval_secs: 3600,
            rebuild_scope: DayScope::Yesterday,
            reset_day_keys: true,
            page_size: DEFAULT_REBUILD_PAGE_SIZE,
            health_interval_secs: 30,
        }
    }
}

impl WorkerConfig {
    /// Options for one scheduled (or cron-triggered) rebuild of `scope`.
    pub fn rebuild_options(&self, scope: DayScope) -> RebuildOptions {
        RebuildOptions::new(vec![scope.day(Utc::now())])
            .apply(true)
            .reset_day_keys(self.reset_day_keys)
            .page_size(self.page_size)
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    store: SharedStore,
    engine: Arc<RebuildEngine>,
}

impl WorkerScheduler {
    pub fn new(config: WorkerConfig, store: SharedStore, engine: Arc<RebuildEngine>) -> Self {
        Self {
            config,
            store,
            engine,
        }
    }

    /// Starts all background workers.
    pub fn start(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_health_probe().await;
        }));

        if self.config.rebuild_enabled {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_rebuild_worker().await;
            }));
            info!(
                scope = self.config.rebuild_scope.as_str(),
                interval_secs = self.config.rebuild_interval_secs,
                "Scheduled rebuild enabled"
            );
        }

        info!("Background workers started");
        handles
    }

    /// Probe the store once and record the result.
    pub async fn probe_store(&self) -> bool {
        let healthy = check_connection(self.store.as_ref()).await;
        if healthy {
            health().store.set_healthy();
        } else {
            health()
                .store
                .set_unhealthy(format!("{} store did not answer PING", self.store.backend()));
        }
        healthy
    }

    /// Rebuild the configured day once.
    pub async fn rebuild_once(&self) -> RebuildReport {
        let options = self.config.rebuild_options(self.config.rebuild_scope);
        let report = self.engine.run(&options).await;
        if report.is_ok() {
            info!(days = ?report.days, "Scheduled rebuild complete");
        } else {
            warn!(failed = ?report.failed_days(), "Scheduled rebuild had failing days");
        }
        report
    }

    async fn run_health_probe(&self) {
        let mut ticker = interval(Duration::from_secs(self.config.health_interval_secs.max(1)));

        loop {
            ticker.tick().await;
            if !self.probe_store().await {
                error!(backend = self.store.backend(), "Store health probe failed");
            }
        }
    }

    async fn run_rebuild_worker(&self) {
        let mut ticker = interval(Duration::from_secs(self.config.rebuild_interval_secs.max(60)));
        // First tick fires immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.rebuild_once().await;
        }
    }
}
