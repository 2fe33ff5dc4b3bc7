//! Server-side location resolution.
//!
//! Edge headers win when they carry a city. Otherwise the client IP is looked
//! up with ipinfo when a token is configured, with results cached per IP.
//! Anything else resolves to `Unknown`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use engine_core::keys::decode_key_part;
use engine_core::{Error, Location, Result};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use telemetry::health;
use tracing::{debug, warn};
use url::Url;

/// Geo configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub city_header: String,
    pub country_header: String,
    /// Enables IP lookup.
    pub ipinfo_token: Option<String>,
    pub ipinfo_url: String,
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            city_header: "x-vercel-ip-city".to_string(),
            country_header: "x-vercel-ip-country".to_string(),
            ipinfo_token: None,
            ipinfo_url: "https://ipinfo.io".to_string(),
            timeout_ms: 1500,
            cache_ttl_secs: 3600,
            cache_capacity: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// Resolves request locations.
#[derive(Clone)]
pub struct GeoResolver {
    config: Arc<GeoConfig>,
    http: reqwest::Client,
    cache: Cache<IpAddr, Location>,
}

impl GeoResolver {
    pub fn new(config: GeoConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|e| Error::config(format!("geo HTTP client: {}", e)))?;
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs.max(1)))
            .build();

        if config.ipinfo_token.is_none() {
            // Nothing remote to fail.
            health().geo.set_healthy();
        }

        Ok(Self {
            config: Arc::new(config),
            http,
            cache,
        })
    }

    pub fn lookup_enabled(&self) -> bool {
        self.token().is_some()
    }

    fn token(&self) -> Option<&str> {
        self.config
            .ipinfo_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Location from edge headers, when they name a city.
    pub fn from_headers(&self, headers: &HeaderMap) -> Option<Location> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(decode_key_part)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let city = header(&self.config.city_header)?;
        let country = header(&self.config.country_header).unwrap_or_default();
        Some(Location::new(&city, &country))
    }

    /// Resolve a request's location. Never fails; lookup problems only mark
    /// the geo component unhealthy.
    pub async fn resolve(&self, headers: &HeaderMap, client_ip: Option<&str>) -> Location {
        if let Some(location) = self.from_headers(headers) {
            return location;
        }

        let Some(ip) = client_ip.and_then(|ip| ip.trim().parse::<IpAddr>().ok()) else {
            return Location::default();
        };
        if !self.lookup_enabled() || !is_public(&ip) {
            return Location::default();
        }

        if let Some(cached) = self.cache.get(&ip).await {
            debug!(%ip, "Geo cache hit");
            return cached;
        }

        match self.lookup(ip).await {
            Ok(location) => {
                health().geo.set_healthy();
                self.cache.insert(ip, location.clone()).await;
                location
            }
            Err(e) => {
                warn!(%ip, error = %e, "Geo lookup failed");
                health().geo.set_unhealthy(e.to_string());
                Location::default()
            }
        }
    }

    async fn lookup(&self, ip: IpAddr) -> Result<Location> {
        let token = self.token().unwrap_or_default();
        let mut url = Url::parse(&self.config.ipinfo_url)
            .and_then(|base| base.join(&ip.to_string()))
            .map_err(|e| Error::config(format!("invalid ipinfo URL: {}", e)))?;
        url.query_pairs_mut().append_pair("token", token);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::internal(format!("ipinfo unavailable: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::internal(format!("ipinfo returned {}", response.status())));
        }

        let info: IpInfoResponse = response
            .json()
            .await
            .map_err(|e| Error::internal(format!("invalid ipinfo response: {}", e)))?;
        Ok(Location::new(
            info.city.as_deref().unwrap_or_default(),
            info.country.as_deref().unwrap_or_default(),
        ))
    }
}

/// Private, loopback and link-local addresses are never looked up.
fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}
