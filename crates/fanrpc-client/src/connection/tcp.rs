use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fanrpc_common::protocol::error::{FanrpcError, Result};
use fanrpc_common::protocol::Request;
use fanrpc_common::transport::TcpTransportAsync;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{guard_call, Connection, DialOptions};

/// Persistent TCP connection carrying length-prefixed JSON frames.
///
/// Calls are serialized on the stream: one request is in flight at a time.
/// A transport failure or timeout mid-call leaves the stream in an unknown
/// state, so the connection drops it and reports itself unavailable. Remote
/// errors leave it usable. The token is checked after the stream is locked
/// and before the request is written; a cancelled call never touches the
/// stream.
#[derive(Debug)]
pub struct TcpConnection {
    addr: String,
    transport: TcpTransportAsync,
    stream: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
    call_timeout: Option<Duration>,
}

impl TcpConnection {
    /// Connects to `addr` (`host:port`).
    pub async fn connect(addr: &str, options: &DialOptions) -> Result<Self> {
        let transport = TcpTransportAsync::new().with_connect_timeout(options.connect_timeout);
        let stream = transport.connect(addr).await?;
        debug!(addr = %addr, "TCP connection established");

        Ok(Self {
            addr: addr.to_string(),
            transport,
            stream: Mutex::new(Some(stream)),
            closed: AtomicBool::new(false),
            call_timeout: options.call_timeout,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn call(&self, token: &CancellationToken, service_method: &str, args: Value) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FanrpcError::ConnectionClosed);
        }

        let mut request = Request::new(service_method, args);
        if let Some(timeout) = self.call_timeout {
            request = request.with_timeout(timeout.as_millis() as u64);
        }

        let mut guard = self.stream.lock().await;
        let result = {
            let Some(stream) = guard.as_mut() else {
                return Err(FanrpcError::ConnectionClosed);
            };
            guard_call(token, self.call_timeout, self.transport.send_request(stream, &request)).await
        };

        match result {
            Ok(response) => {
                if self.closed.load(Ordering::Acquire) {
                    // closed while this call held the stream
                    *guard = None;
                }
                response.into_result()
            }
            Err(e) => {
                if e.breaks_connection() {
                    warn!(addr = %self.addr, error = %e, "TCP connection broken, marking unavailable");
                    self.closed.store(true, Ordering::Release);
                    *guard = None;
                }
                Err(e)
            }
        }
    }

    fn is_available(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(addr = %self.addr, "Closing TCP connection");

        // An in-flight call drops the stream itself when it finishes
        if let Ok(mut guard) = self.stream.try_lock() {
            if let Some(mut stream) = guard.take() {
                let _ = stream.shutdown().await;
            }
        }
        Ok(())
    }
}
