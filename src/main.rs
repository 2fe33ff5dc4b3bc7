//! Tally Engine
//!
//! Event-sourced open-event counters:
//! - Idempotent ingestion with one atomic fan-out per event
//! - Durable per-day raw event log
//! - Deterministic rebuild of day aggregates from the log
//! - Unique-visitor reporting with labeled estimates

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use api::{router, AppState, GeoConfig, GeoResolver};
use engine_core::auth::AccessTokens;
use engine_core::RetentionPolicy;
use kv_store::StoreConfig;
use telemetry::init_tracing_from_env;
use worker::{RebuildEngine, WorkerConfig, WorkerScheduler};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    store: StoreConfig,

    #[serde(default)]
    retention: RetentionPolicy,

    #[serde(default)]
    tokens: AccessTokens,

    #[serde(default)]
    geo: GeoConfig,

    #[serde(default)]
    worker: WorkerConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            store: StoreConfig::default(),
            retention: RetentionPolicy::default(),
            tokens: AccessTokens::default(),
            geo: GeoConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Tally Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        store = if config.store.is_memory() { "memory" } else { "rest" },
        ttl_days = config.retention.ttl_days,
        unique_ttl_days = config.retention.unique_ttl_days,
        raw_ttl_days = config.retention.raw_ttl_days,
        scheduled_rebuild = config.worker.rebuild_enabled,
        "Loaded config"
    );

    let store = kv_store::connect(&config.store).context("Failed to create store client")?;
    let geo = GeoResolver::new(config.geo.clone()).context("Failed to create geo resolver")?;
    if !geo.lookup_enabled() {
        info!("IP geo lookup disabled; edge headers only");
    }

    // Background workers: health probe first so readiness is known early
    let scheduler = Arc::new(WorkerScheduler::new(
        config.worker.clone(),
        store.clone(),
        Arc::new(RebuildEngine::new(store.clone(), config.retention.clone())),
    ));
    if !scheduler.probe_store().await {
        error!("Store unreachable at startup; serving with readiness down");
    }
    let worker_handles = scheduler.start();

    let state = AppState::new(
        store,
        config.retention.clone(),
        config.tokens.clone(),
        geo,
        config.worker.clone(),
    );
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");
    for handle in worker_handles {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("TALLY")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    apply_legacy_env(&mut config);
    Ok(config)
}

/// First non-empty value among `names`.
fn env_value(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn env_number(name: &str) -> Option<u64> {
    let raw = env_value(&[name])?;
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring non-numeric setting");
            None
        }
    }
}

/// Overrides from the variable names deployments already use.
fn apply_legacy_env(config: &mut Config) {
    if let Some(url) = env_value(&["KV_REST_API_URL", "UPSTASH_REDIS_REST_URL"]) {
        config.store.url = url;
    }
    if let Some(token) = env_value(&["KV_REST_API_TOKEN", "UPSTASH_REDIS_REST_TOKEN"]) {
        config.store.token = Some(token);
    }

    if let Some(days) = env_number("TELEMETRY_TTL_DAYS") {
        config.retention.ttl_days = days;
    }
    if let Some(days) = env_number("TELEMETRY_UNIQUE_TTL_DAYS") {
        config.retention.unique_ttl_days = days;
    }
    if let Some(days) = env_number("TELEMETRY_RAW_TTL_DAYS") {
        config.retention.raw_ttl_days = days;
    }

    if let Some(token) = env_value(&["TELEMETRY_REBUILD_TOKEN"]) {
        config.tokens.rebuild = Some(token);
    }
    if let Some(token) = env_value(&["TELEMETRY_MIGRATE_TOKEN"]) {
        config.tokens.migrate = Some(token);
    }
    if let Some(token) = env_value(&["TELEMETRY_STATS_TOKEN"]) {
        config.tokens.stats = Some(token);
    }
    if let Some(secret) = env_value(&["CRON_SECRET"]) {
        config.tokens.cron = Some(secret);
    }

    if let Some(reset) = env_value(&["TELEMETRY_REBUILD_RESET_DAY_KEYS"]) {
        config.worker.reset_day_keys = !reset.eq_ignore_ascii_case("false");
    }
    if let Some(token) = env_value(&["IPINFO_TOKEN"]) {
        config.geo.ipinfo_token = Some(token);
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
