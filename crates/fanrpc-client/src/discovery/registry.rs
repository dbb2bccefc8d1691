//! Registry-backed discovery
//!
//! The registry is any HTTP endpoint that answers a `GET` with the live
//! server list in the [`SERVERS_HEADER`] response header, as a comma
//! separated list:
//!
//! ```text
//! X-Fanrpc-Servers: tcp@10.0.0.1:9001, tcp@10.0.0.2:9001
//! ```
//!
//! The list is cached for a TTL window; selections inside the window never
//! touch the network.

use std::time::Duration;

use async_trait::async_trait;
use fanrpc_common::protocol::error::{FanrpcError, Result};
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{Discovery, SelectMode, StaticDiscovery};

/// Response header carrying the comma separated server list
pub const SERVERS_HEADER: &str = "X-Fanrpc-Servers";

/// Default staleness window for the cached list (10 seconds)
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Default timeout for one registry round trip (5 seconds)
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry discovery configuration.
///
/// # Default Configuration
///
/// - `ttl_ms`: 10000 (a value of 0 also means the default)
/// - `fetch_timeout_ms`: 5000
/// - `serve_stale_on_error`: true
///
/// # Example
///
/// ```rust
/// use fanrpc_client::RegistryConfig;
///
/// let config = RegistryConfig::new("http://127.0.0.1:9999/_fanrpc_/registry")
///     .with_ttl_ms(30_000);
/// assert_eq!(config.ttl().as_secs(), 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry URL to `GET`
    pub url: String,
    /// How long a fetched list stays fresh, in milliseconds
    #[serde(default)]
    pub ttl_ms: u64,
    /// Timeout for one registry round trip, in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Keep answering `get`/`get_all` from the cached list when a refresh
    /// fails and the cache is non-empty
    #[serde(default = "default_serve_stale")]
    pub serve_stale_on_error: bool,
}

fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_millis() as u64
}

fn default_serve_stale() -> bool {
    true
}

impl RegistryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ttl_ms: DEFAULT_TTL.as_millis() as u64,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            serve_stale_on_error: default_serve_stale(),
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn with_fetch_timeout_ms(mut self, fetch_timeout_ms: u64) -> Self {
        self.fetch_timeout_ms = fetch_timeout_ms;
        self
    }

    pub fn with_serve_stale_on_error(mut self, serve_stale: bool) -> Self {
        self.serve_stale_on_error = serve_stale;
        self
    }

    /// Effective TTL; zero falls back to [`DEFAULT_TTL`].
    pub fn ttl(&self) -> Duration {
        if self.ttl_ms == 0 {
            DEFAULT_TTL
        } else {
            Duration::from_millis(self.ttl_ms)
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Discovery that pulls its list from a registry and caches it for a TTL.
///
/// Selection is delegated to an inner [`StaticDiscovery`]; this type only adds
/// the refresh gate in front of it.
///
/// Refreshes are single-flight: concurrent callers that find the list stale
/// queue on one lock and re-check freshness, so a TTL window costs at most
/// one registry request.
pub struct RegistryDiscovery {
    servers: StaticDiscovery,
    config: RegistryConfig,
    last_update: Mutex<Option<Instant>>,
    refresh_lock: tokio::sync::Mutex<()>,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl std::fmt::Debug for RegistryDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryDiscovery")
            .field("registry", &self.config.url)
            .field("ttl", &self.config.ttl())
            .field("servers", &self.servers)
            .finish()
    }
}

impl RegistryDiscovery {
    /// Creates a discovery polling `registry_url` with the default TTL.
    ///
    /// No request is made until the first selection.
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self::with_config(RegistryConfig::new(registry_url))
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            servers: StaticDiscovery::default(),
            config,
            last_update: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            client,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The cached list, without consulting the registry.
    pub fn cached(&self) -> Vec<String> {
        self.servers.snapshot()
    }

    fn is_fresh(&self) -> bool {
        match *self.last_update.lock() {
            Some(at) => at + self.config.ttl() > Instant::now(),
            None => false,
        }
    }

    fn mark_updated(&self) {
        *self.last_update.lock() = Some(Instant::now());
    }

    /// Fetches the server list from the registry.
    async fn fetch_servers(&self) -> Result<Vec<String>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(&self.config.url)
            .body(Empty::<Bytes>::new())
            .map_err(|e| FanrpcError::RegistryFetch(format!("invalid registry url '{}': {}", self.config.url, e)))?;

        let timeout = self.config.fetch_timeout();
        let response = tokio::time::timeout(timeout, self.client.request(request))
            .await
            .map_err(|_| FanrpcError::RegistryFetch(format!("timed out after {}ms", timeout.as_millis())))?
            .map_err(|e| FanrpcError::RegistryFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FanrpcError::RegistryFetch(format!(
                "registry answered with status {}",
                response.status()
            )));
        }

        match response.headers().get(SERVERS_HEADER) {
            Some(value) => {
                let value = value.to_str().map_err(|e| {
                    FanrpcError::RegistryFetch(format!("unreadable {} header: {}", SERVERS_HEADER, e))
                })?;
                Ok(parse_servers_header(value))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Runs `refresh` and decides whether a failure should reach the caller.
    async fn refresh_for_selection(&self) -> Result<()> {
        match self.refresh().await {
            Ok(()) => Ok(()),
            Err(e) if self.config.serve_stale_on_error && !self.servers.is_empty() => {
                warn!(
                    registry = %self.config.url,
                    error = %e,
                    "Registry refresh failed, serving cached servers"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Splits a registry header value into addresses, dropping blank entries.
pub fn parse_servers_header(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    async fn refresh(&self) -> Result<()> {
        if self.is_fresh() {
            return Ok(());
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if self.is_fresh() {
            return Ok(());
        }

        info!(registry = %self.config.url, "Refreshing servers from registry");

        match self.fetch_servers().await {
            Ok(servers) => {
                debug!(registry = %self.config.url, count = servers.len(), "Registry refresh completed");
                self.servers.replace(servers);
                self.mark_updated();
                Ok(())
            }
            Err(e) => {
                error!(
                    registry = %self.config.url,
                    error = %e,
                    "Registry refresh failed, keeping existing servers"
                );
                Err(e)
            }
        }
    }

    /// Waits for an in-flight refresh, so a fetch can never overwrite an
    /// explicitly set list.
    async fn update(&self, servers: Vec<String>) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        self.servers.replace(servers);
        self.mark_updated();
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.refresh_for_selection().await?;
        self.servers.get(mode).await
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        self.refresh_for_selection().await?;
        self.servers.get_all().await
    }
}
