//! Common test setup functions.

use api::{router, AppState, GeoConfig, GeoResolver};
use axum_test::TestServer;
use engine_core::auth::AccessTokens;
use engine_core::RetentionPolicy;
use kv_store::{ops, Command, KvStore, MemoryStore, SharedStore, StoreConfig};
use std::sync::Arc;
use worker::WorkerConfig;

use crate::containers::StoreContainers;
use crate::fixtures::{CRON_TOKEN, MIGRATE_TOKEN, REBUILD_TOKEN};
use crate::mocks::FlakyStore;

/// Test context over the real router and an in-memory store.
///
/// Requests go through the same extractors, handlers and middleware as in
/// production; only the store backend differs. Geo lookup is header-only.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub flaky: FlakyStore,
    pub server: TestServer,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_tokens(default_tokens())
    }

    pub fn with_tokens(tokens: AccessTokens) -> Self {
        let store = Arc::new(MemoryStore::new());
        let flaky = FlakyStore::new(store.clone());
        let shared: SharedStore = Arc::new(flaky.clone());

        let geo = GeoResolver::new(GeoConfig::default()).expect("Failed to create geo resolver");
        let state = AppState::new(
            shared,
            RetentionPolicy::default(),
            tokens,
            geo,
            WorkerConfig::default(),
        );
        let server = TestServer::new(router(state)).expect("Failed to create test server");

        Self {
            store,
            flaky,
            server,
        }
    }

    /// Counter value, zero when absent.
    pub fn counter(&self, key: &str) -> u64 {
        self.store
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Overwrite keys directly, bypassing ingestion.
    pub async fn seed(&self, commands: Vec<Command>) {
        self.store
            .pipeline(commands)
            .await
            .expect("Failed to seed store");
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Test context over the real router and the REST store backend.
pub struct RestContext {
    #[allow(dead_code)]
    pub containers: StoreContainers,
    pub store: SharedStore,
    pub server: TestServer,
}

impl RestContext {
    /// Start the store containers and clear the key namespace.
    pub async fn new() -> Self {
        let containers = StoreContainers::start().await;
        let config = StoreConfig {
            url: containers.store_url.clone(),
            token: Some(containers.store_token.clone()),
            timeout_secs: 10,
        };
        let store = kv_store::connect(&config).expect("Failed to create REST store");

        let stale = ops::scan_keys(store.as_ref(), "telemetry:*")
            .await
            .expect("Failed to scan store");
        ops::delete_keys(store.as_ref(), &stale, 500)
            .await
            .expect("Failed to clear store");

        let geo = GeoResolver::new(GeoConfig::default()).expect("Failed to create geo resolver");
        let state = AppState::new(
            store.clone(),
            RetentionPolicy::default(),
            default_tokens(),
            geo,
            WorkerConfig::default(),
        );
        let server = TestServer::new(router(state)).expect("Failed to create test server");

        Self {
            containers,
            store,
            server,
        }
    }

    /// Counter value, zero when absent.
    pub async fn counter(&self, key: &str) -> u64 {
        self.store
            .execute(Command::get(key))
            .await
            .expect("Failed to read counter")
            .as_str()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

pub fn default_tokens() -> AccessTokens {
    AccessTokens {
        rebuild: Some(REBUILD_TOKEN.into()),
        migrate: Some(MIGRATE_TOKEN.into()),
        cron: Some(CRON_TOKEN.into()),
        stats: None,
    }
}
