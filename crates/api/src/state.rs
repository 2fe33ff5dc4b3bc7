//! Application state shared across handlers.

use std::sync::Arc;

use engine_core::auth::AccessTokens;
use engine_core::RetentionPolicy;
use ingest::IngestProcessor;
use kv_store::SharedStore;
use worker::{LegacyMigrator, RebuildEngine, WorkerConfig};

use crate::geo::GeoResolver;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Backing store (REST in production, in-memory in tests)
    pub store: SharedStore,
    pub processor: Arc<IngestProcessor>,
    pub rebuild: Arc<RebuildEngine>,
    pub migrator: Arc<LegacyMigrator>,
    pub geo: GeoResolver,
    pub tokens: Arc<AccessTokens>,
    /// Rebuild defaults shared with the scheduler (page size, cron scope,
    /// reset behaviour).
    pub worker: Arc<WorkerConfig>,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        retention: RetentionPolicy,
        tokens: AccessTokens,
        geo: GeoResolver,
        worker: WorkerConfig,
    ) -> Self {
        Self {
            processor: Arc::new(IngestProcessor::new(store.clone(), retention.clone())),
            rebuild: Arc::new(RebuildEngine::new(store.clone(), retention.clone())),
            migrator: Arc::new(LegacyMigrator::new(store.clone(), retention)),
            store,
            geo,
            tokens: Arc::new(tokens),
            worker: Arc::new(worker),
        }
    }
}
