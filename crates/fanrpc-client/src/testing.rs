//! In-memory connections and dialers for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanrpc_common::protocol::error::{FanrpcError, Result};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, Dialer};

/// What a mock endpoint does when called.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer with this value
    Reply(Value),
    /// Fail with a remote error carrying this message
    Fail(String),
    /// Fail with a connection error and become unavailable
    Break,
    /// Block until the call's token is cancelled, like a connection that
    /// watches the token while waiting
    WaitForCancel,
}

#[derive(Debug)]
pub struct MockConnection {
    addr: String,
    behavior: Behavior,
    delay: Duration,
    available: AtomicBool,
    closed: AtomicBool,
    calls: AtomicUsize,
}

impl MockConnection {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    /// Mirrors the bundled connections: a call whose token already fired is
    /// refused without being counted, a counted call runs to completion.
    async fn call(&self, token: &CancellationToken, _service_method: &str, _args: Value) -> Result<Value> {
        if token.is_cancelled() {
            return Err(FanrpcError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behavior {
            Behavior::Reply(value) => Ok(value.clone()),
            Behavior::Fail(msg) => Err(FanrpcError::Remote(format!("{}: {}", self.addr, msg))),
            Behavior::Break => {
                self.available.store(false, Ordering::SeqCst);
                Err(FanrpcError::Connection(format!("{}: connection reset", self.addr)))
            }
            Behavior::WaitForCancel => {
                token.cancelled().await;
                Err(FanrpcError::Cancelled)
            }
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.available.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Dialer over a fixed table of mock endpoints. Unknown addresses refuse.
#[derive(Debug, Default)]
pub struct MockDialer {
    endpoints: HashMap<String, (Behavior, Duration)>,
    dial_delay: Duration,
    dialed: Mutex<HashMap<String, Vec<Arc<MockConnection>>>>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(self, addr: &str, behavior: Behavior) -> Self {
        self.slow_endpoint(addr, behavior, Duration::ZERO)
    }

    /// Endpoint that waits `delay` before answering.
    pub fn slow_endpoint(mut self, addr: &str, behavior: Behavior, delay: Duration) -> Self {
        self.endpoints.insert(addr.to_string(), (behavior, delay));
        self
    }

    pub fn with_dial_delay(mut self, delay: Duration) -> Self {
        self.dial_delay = delay;
        self
    }

    pub fn dial_count(&self, addr: &str) -> usize {
        self.dialed.lock().get(addr).map(Vec::len).unwrap_or(0)
    }

    /// Every connection dialed to `addr`, oldest first.
    pub fn connections(&self, addr: &str) -> Vec<Arc<MockConnection>> {
        self.dialed.lock().get(addr).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn Connection>> {
        if !self.dial_delay.is_zero() {
            tokio::time::sleep(self.dial_delay).await;
        }

        let Some((behavior, delay)) = self.endpoints.get(addr).cloned() else {
            return Err(FanrpcError::Connection(format!("Failed to connect to {}: connection refused", addr)));
        };

        let conn = Arc::new(MockConnection {
            addr: addr.to_string(),
            behavior,
            delay,
            available: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        });
        self.dialed
            .lock()
            .entry(addr.to_string())
            .or_default()
            .push(conn.clone());
        Ok(conn)
    }
}
