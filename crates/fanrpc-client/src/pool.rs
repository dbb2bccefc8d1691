use std::collections::HashMap;
use std::sync::Arc;

use fanrpc_common::protocol::error::{FanrpcError, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::connection::{Connection, Dialer};

/// Cache of open connections, one per endpoint address.
///
/// # Architecture
///
/// - Entries are created lazily by [`acquire`](Self::acquire) and shared by
///   every caller targeting the same address
/// - An entry that reports itself unavailable is evicted and closed the next
///   time it is looked up
/// - Dialing happens while the cache lock is held, so concurrent acquires of
///   one address produce exactly one connection
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use fanrpc_client::{ConnectionPool, TransportDialer};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = ConnectionPool::new(Arc::new(TransportDialer::default()));
///
/// let conn = pool.acquire("tcp@127.0.0.1:9001").await?;
/// // the same connection comes back while it stays healthy
/// let again = pool.acquire("tcp@127.0.0.1:9001").await?;
/// assert!(Arc::ptr_eq(&conn, &again));
///
/// pool.drain().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConnectionPool {
    dialer: Arc<dyn Dialer>,
    connections: Mutex<HashMap<String, Arc<dyn Connection>>>,
}

impl ConnectionPool {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached connection for `addr`, dialing a new one if there
    /// is none or the cached one is no longer available.
    ///
    /// # Errors
    ///
    /// - `InvalidAddress` if the address cannot be parsed by the dialer
    /// - `Dial` for any other dial failure; the cache is left unchanged
    pub async fn acquire(&self, addr: &str) -> Result<Arc<dyn Connection>> {
        let mut connections = self.connections.lock().await;

        if let Some(conn) = connections.get(addr) {
            if conn.is_available() {
                debug!(addr = %addr, "Reusing cached connection");
                return Ok(conn.clone());
            }
        }

        if let Some(stale) = connections.remove(addr) {
            warn!(addr = %addr, "Evicting unavailable connection");
            if let Err(e) = stale.close().await {
                debug!(addr = %addr, error = %e, "Error closing evicted connection");
            }
        }

        let conn = self.dialer.dial(addr).await.map_err(|e| match e {
            FanrpcError::Dial { .. } | FanrpcError::InvalidAddress(_) => e,
            other => FanrpcError::dial(addr, other),
        })?;

        debug!(addr = %addr, "Caching new connection");
        connections.insert(addr.to_string(), conn.clone());
        Ok(conn)
    }

    /// Removes and closes the entry for `addr`. Returns whether one existed.
    pub async fn evict(&self, addr: &str) -> bool {
        let removed = self.connections.lock().await.remove(addr);
        match removed {
            Some(conn) => {
                debug!(addr = %addr, "Evicting connection");
                if let Err(e) = conn.close().await {
                    debug!(addr = %addr, error = %e, "Error closing evicted connection");
                }
                true
            }
            None => false,
        }
    }

    /// Closes every cached connection and empties the cache.
    pub async fn drain(&self) {
        let mut connections = self.connections.lock().await;
        let count = connections.len();

        for (addr, conn) in connections.drain() {
            if let Err(e) = conn.close().await {
                debug!(addr = %addr, error = %e, "Error closing connection");
            }
        }

        if count > 0 {
            debug!(count, "Connection pool drained");
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, addr: &str) -> bool {
        self.connections.lock().await.contains_key(addr)
    }
}
