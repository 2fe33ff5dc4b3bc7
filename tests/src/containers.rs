//! Testcontainer setup for the REST store backend.
//!
//! Redis runs behind an Upstash-compatible HTTP proxy on a private network,
//! so `RestStore` talks to the same `/pipeline` and `/multi-exec` endpoints
//! it uses in production.

use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use uuid::Uuid;

const PROXY_TOKEN: &str = "tally-test-token";

/// Container handles for the REST store.
pub struct StoreContainers {
    #[allow(dead_code)]
    redis: Option<ContainerAsync<GenericImage>>,
    #[allow(dead_code)]
    proxy: Option<ContainerAsync<GenericImage>>,
    pub store_url: String,
    pub store_token: String,
}

impl StoreContainers {
    /// Start Redis and the REST proxy, or use `TALLY_TEST_KV_URL` when set.
    ///
    /// An external store must be disposable: tests clear `telemetry:*`.
    pub async fn start() -> Self {
        if let Some(url) = std::env::var("TALLY_TEST_KV_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            return Self {
                redis: None,
                proxy: None,
                store_url: url,
                store_token: std::env::var("TALLY_TEST_KV_TOKEN")
                    .unwrap_or_else(|_| PROXY_TOKEN.to_string()),
            };
        }

        let network = format!("tally-test-{}", Uuid::new_v4().simple());
        let redis_name = format!("{}-redis", network);

        let redis = GenericImage::new("redis", "7-alpine")
            .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
            .with_exposed_port(6379.tcp())
            .with_network(network.clone())
            .with_container_name(redis_name.clone())
            .start()
            .await
            .expect("Failed to start Redis");

        let proxy = GenericImage::new("hiett/serverless-redis-http", "latest")
            .with_exposed_port(80.tcp())
            .with_env_var("SRH_MODE", "env")
            .with_env_var("SRH_TOKEN", PROXY_TOKEN)
            .with_env_var("SRH_CONNECTION_STRING", format!("redis://{}:6379", redis_name))
            .with_network(network)
            .start()
            .await
            .expect("Failed to start REST proxy");

        let port = proxy.get_host_port_ipv4(80).await.unwrap();
        let url = format!("http://127.0.0.1:{}", port);

        wait_for_proxy(&url, PROXY_TOKEN, Duration::from_secs(30)).await;

        Self {
            redis: Some(redis),
            proxy: Some(proxy),
            store_url: url,
            store_token: PROXY_TOKEN.to_string(),
        }
    }
}

/// Wait until the proxy answers a PING pipeline.
async fn wait_for_proxy(url: &str, token: &str, timeout: Duration) {
    let client = reqwest::Client::new();
    let start = std::time::Instant::now();
    let endpoint = format!("{}/pipeline", url);

    while start.elapsed() < timeout {
        let sent = client
            .post(&endpoint)
            .bearer_auth(token)
            .json(&[["PING"]])
            .send()
            .await;
        if let Ok(resp) = sent {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("REST proxy {} not ready after {:?}", url, timeout);
}
