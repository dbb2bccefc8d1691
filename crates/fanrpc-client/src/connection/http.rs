use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fanrpc_common::protocol::error::{FanrpcError, Result};
use fanrpc_common::protocol::{JsonRpcRequest, JsonRpcResponse};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{guard_call, Connection, DialOptions};

pub(crate) type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Builds the pooled hyper client shared by every HTTP connection of a dialer.
pub(crate) fn build_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// JSON-RPC 2.0 over HTTP POST to `http://host:port/`.
///
/// Sockets are managed by the shared hyper client, which opens them on first
/// use and keeps them alive between calls. Concurrent calls are allowed.
#[derive(Debug)]
pub struct HttpConnection {
    addr: String,
    url: String,
    client: HttpClient,
    call_timeout: Option<Duration>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl HttpConnection {
    pub(crate) fn new(addr: &str, client: HttpClient, options: &DialOptions) -> Self {
        Self {
            addr: addr.to_string(),
            url: format!("http://{}/", addr),
            client,
            call_timeout: options.call_timeout,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn post(&self, request: &JsonRpcRequest) -> Result<Value> {
        let body = serde_json::to_vec(request)?;

        let http_request = Request::builder()
            .method(Method::POST)
            .uri(&self.url)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| FanrpcError::InvalidAddress(format!("{}: {}", self.url, e)))?;

        let response = self
            .client
            .request(http_request)
            .await
            .map_err(|e| FanrpcError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| FanrpcError::Transport(format!("Failed to read response: {}", e)))?
            .to_bytes();

        let rpc_response: JsonRpcResponse = serde_json::from_slice(&body).map_err(|e| {
            if status.is_success() {
                FanrpcError::InvalidResponse(format!("malformed JSON-RPC response: {}", e))
            } else {
                FanrpcError::Transport(format!("HTTP status {}", status))
            }
        })?;

        rpc_response.into_result()
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn call(&self, token: &CancellationToken, service_method: &str, args: Value) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FanrpcError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(service_method, args, json!(id));

        let result = guard_call(token, self.call_timeout, self.post(&request)).await;
        if let Err(e) = &result {
            if e.breaks_connection() {
                warn!(addr = %self.addr, error = %e, "HTTP connection failed, marking unavailable");
                self.closed.store(true, Ordering::Release);
            }
        }
        result
    }

    fn is_available(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(addr = %self.addr, "Closing HTTP connection");
        }
        Ok(())
    }
}
