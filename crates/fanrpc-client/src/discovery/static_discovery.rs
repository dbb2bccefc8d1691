use async_trait::async_trait;
use fanrpc_common::protocol::error::{FanrpcError, Result};
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use super::{Discovery, SelectMode};

/// Discovery over a fixed, explicitly updatable list of endpoints.
///
/// The list and the round-robin cursor sit behind one lock, so a selection
/// never sees a half-replaced list and no two selections share a cursor
/// value.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    servers: Vec<String>,
    /// Next round-robin position, always `< servers.len()` once used
    index: usize,
}

impl StaticDiscovery {
    /// Create a discovery over `servers`, kept in the given order.
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            state: Mutex::new(State { servers, index: 0 }),
        }
    }

    /// Replace the list.
    pub fn replace(&self, servers: Vec<String>) {
        let mut state = self.state.lock();
        debug!(old_count = state.servers.len(), new_count = servers.len(), "Replacing server list");
        state.servers = servers;
    }

    /// Pick one endpoint according to `mode`.
    pub fn select(&self, mode: SelectMode) -> Result<String> {
        let mut state = self.state.lock();
        let n = state.servers.len();
        if n == 0 {
            return Err(FanrpcError::NoAvailableServers);
        }

        match mode {
            SelectMode::Random => {
                let i = rand::rng().random_range(0..n);
                Ok(state.servers[i].clone())
            }
            SelectMode::RoundRobin => {
                // The list may have shrunk since the cursor last moved
                let i = state.index % n;
                state.index = (i + 1) % n;
                Ok(state.servers[i].clone())
            }
        }
    }

    /// Copy of the current list.
    pub fn snapshot(&self) -> Vec<String> {
        self.state.lock().servers.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<String>> for StaticDiscovery {
    fn from(servers: Vec<String>) -> Self {
        Self::new(servers)
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        self.replace(servers);
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.select(mode)
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        let servers = self.snapshot();
        if servers.is_empty() {
            return Err(FanrpcError::NoAvailableServers);
        }
        Ok(servers)
    }
}
