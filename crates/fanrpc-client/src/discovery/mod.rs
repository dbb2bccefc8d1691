//! Endpoint discovery
//!
//! A [`Discovery`] answers two questions: which endpoints exist right now, and
//! which one should the next call go to.
//!
//! # Implementations
//!
//! - [`StaticDiscovery`]: an in-memory list, replaced explicitly via `update`
//! - [`RegistryDiscovery`]: a `StaticDiscovery` that re-pulls its list from a
//!   registry over HTTP once the cached copy is older than its TTL

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use fanrpc_common::protocol::error::{FanrpcError, Result};
use serde::{Deserialize, Serialize};

pub mod registry;
pub mod static_discovery;

pub use registry::{RegistryConfig, RegistryDiscovery, SERVERS_HEADER};
pub use static_discovery::StaticDiscovery;

/// Policy used to pick a single endpoint from the discovered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectMode {
    /// Uniformly random endpoint on every call
    #[default]
    Random,
    /// Cycle through endpoints in list order
    RoundRobin,
}

impl fmt::Display for SelectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectMode::Random => write!(f, "random"),
            SelectMode::RoundRobin => write!(f, "round-robin"),
        }
    }
}

impl FromStr for SelectMode {
    type Err = FanrpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(SelectMode::Random),
            "round-robin" | "round_robin" | "roundrobin" => Ok(SelectMode::RoundRobin),
            other => Err(FanrpcError::InvalidRequest(format!(
                "unknown select mode '{}' (expected random or round-robin)",
                other
            ))),
        }
    }
}

/// Source of endpoint addresses.
///
/// Implementations guard their own state and are shared behind an `Arc`
/// by the dispatcher.
#[async_trait]
pub trait Discovery: Send + Sync + fmt::Debug {
    /// Re-derives the endpoint list from its source if it is stale.
    ///
    /// This is a no-op while the cached list is still fresh, so it is cheap
    /// to call before every selection.
    async fn refresh(&self) -> Result<()>;

    /// Replaces the endpoint list and resets the staleness clock.
    async fn update(&self, servers: Vec<String>) -> Result<()>;

    /// Picks one endpoint according to `mode`.
    ///
    /// # Errors
    ///
    /// Returns `NoAvailableServers` if the list is empty.
    async fn get(&self, mode: SelectMode) -> Result<String>;

    /// Returns a snapshot of every known endpoint.
    ///
    /// # Errors
    ///
    /// Returns `NoAvailableServers` if the list is empty.
    async fn get_all(&self) -> Result<Vec<String>>;
}
