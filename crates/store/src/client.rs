//! REST pipeline client for an Upstash-compatible store.

use async_trait::async_trait;
use engine_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::command::{Command, Reply};
use crate::config::StoreConfig;
use crate::memory::MemoryStore;
use crate::store::{KvStore, SharedStore};

/// Pipelined commands go to `/pipeline`, atomic batches to `/multi-exec`.
#[derive(Clone)]
pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

/// One element of the response array.
#[derive(Debug, Deserialize)]
struct ReplyItem {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl ReplyItem {
    fn into_reply(self) -> Reply {
        match (self.error, self.result) {
            (Some(error), _) => Reply::Error(error),
            (None, Some(value)) => Reply::from_json(value),
            (None, None) => Reply::Nil,
        }
    }
}

impl RestStore {
    /// Creates a new REST store client.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let token = config
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::config("store token is required for the REST backend"))?
            .to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = config.url.trim().trim_end_matches('/').to_string();
        info!(url = %base_url, "Created REST store client");

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    async fn send(&self, endpoint: &str, commands: Vec<Command>) -> Result<Vec<Reply>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let body: Vec<Vec<String>> = commands.iter().map(Command::to_args).collect();
        let url = format!("{}/{}", self.base_url, endpoint);
        let start = Instant::now();

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                metrics().store_errors.inc();
                Error::storage(format!("store request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            metrics().store_errors.inc();
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, endpoint, detail = %detail, "Store rejected request");
            return Err(Error::storage(format!("store returned {}: {}", status, detail)));
        }

        let items: Vec<ReplyItem> = response.json().await.map_err(|e| {
            metrics().store_errors.inc();
            Error::storage(format!("invalid store response: {}", e))
        })?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        metrics().store_latency_ms.observe(elapsed_ms);

        if items.len() != commands.len() {
            metrics().store_errors.inc();
            return Err(Error::storage(format!(
                "store returned {} replies for {} commands",
                items.len(),
                commands.len()
            )));
        }

        debug!(endpoint, commands = commands.len(), elapsed_ms, "Store round trip");
        Ok(items.into_iter().map(ReplyItem::into_reply).collect())
    }
}

#[async_trait]
impl KvStore for RestStore {
    async fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        self.send("pipeline", commands).await
    }

    async fn transaction(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        self.send("multi-exec", commands).await
    }

    fn backend(&self) -> &'static str {
        "rest"
    }
}

/// Build the configured backend.
pub fn connect(config: &StoreConfig) -> Result<SharedStore> {
    if config.is_memory() {
        warn!("No store URL configured, using the in-process store; data will not survive restarts");
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(RestStore::new(config)?))
}
