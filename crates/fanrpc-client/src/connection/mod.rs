//! Connections to a single endpoint
//!
//! The dispatcher only ever talks to the [`Connection`] and [`Dialer`] traits.
//! [`TransportDialer`] is the bundled dialer; it reads the protocol from the
//! endpoint address:
//!
//! - `tcp@host:port` or a bare `host:port`: [`TcpConnection`], one persistent
//!   stream speaking length-prefixed JSON
//! - `http@host:port`: [`HttpConnection`], JSON-RPC 2.0 over HTTP POST

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanrpc_common::protocol::error::{FanrpcError, Result};
use fanrpc_common::transport::tcp::DEFAULT_CONNECT_TIMEOUT;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod http;
pub mod tcp;

pub use http::HttpConnection;
pub use tcp::TcpConnection;

/// An open channel to one endpoint.
///
/// Implementations must tolerate concurrent `call`s from several tasks.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Invokes `service_method` with `args` and returns the raw reply.
    ///
    /// The token is advisory. The bundled connections return `Cancelled`
    /// without touching the wire when it has fired before the request is
    /// sent; a request already sent is waited for.
    async fn call(&self, token: &CancellationToken, service_method: &str, args: Value) -> Result<Value>;

    /// Whether the connection can still carry calls.
    fn is_available(&self) -> bool;

    async fn close(&self) -> Result<()>;
}

/// Opens connections to endpoint addresses.
#[async_trait]
pub trait Dialer: Send + Sync + fmt::Debug {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn Connection>>;
}

/// Options applied to every connection a [`TransportDialer`] opens.
///
/// # Default Configuration
///
/// - `connect_timeout`: 10 seconds
/// - `call_timeout`: none
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialOptions {
    /// Bound on establishing the connection
    pub connect_timeout: Duration,
    /// Bound on one call, from send to reply
    pub call_timeout: Option<Duration>,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: None,
        }
    }
}

impl DialOptions {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// Wire protocol named by an endpoint address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Http => write!(f, "http"),
        }
    }
}

/// A parsed `protocol@host:port` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub protocol: Protocol,
    /// The `host:port` part
    pub address: String,
}

impl FromStr for Endpoint {
    type Err = FanrpcError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (protocol, address) = match s.split_once('@') {
            Some((proto, address)) => {
                let protocol = match proto.to_ascii_lowercase().as_str() {
                    "tcp" => Protocol::Tcp,
                    "http" => Protocol::Http,
                    other => {
                        return Err(FanrpcError::InvalidAddress(format!(
                            "unsupported protocol '{}' in '{}'",
                            other, s
                        )))
                    }
                };
                (protocol, address)
            }
            None => (Protocol::Tcp, s),
        };

        if address.is_empty() {
            return Err(FanrpcError::InvalidAddress(format!("missing host:port in '{}'", s)));
        }

        Ok(Endpoint {
            protocol,
            address: address.to_string(),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.protocol, self.address)
    }
}

/// Dialer for the bundled TCP and HTTP connections.
#[derive(Debug, Clone)]
pub struct TransportDialer {
    options: DialOptions,
    http_client: http::HttpClient,
}

impl TransportDialer {
    pub fn new(options: DialOptions) -> Self {
        Self {
            options,
            http_client: http::build_client(options.connect_timeout),
        }
    }

    pub fn options(&self) -> &DialOptions {
        &self.options
    }
}

impl Default for TransportDialer {
    fn default() -> Self {
        Self::new(DialOptions::default())
    }
}

#[async_trait]
impl Dialer for TransportDialer {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn Connection>> {
        let endpoint: Endpoint = addr.parse()?;
        debug!(addr = %addr, protocol = %endpoint.protocol, "Dialing endpoint");

        match endpoint.protocol {
            Protocol::Tcp => {
                let conn = TcpConnection::connect(&endpoint.address, &self.options).await?;
                Ok(Arc::new(conn))
            }
            Protocol::Http => {
                let conn = HttpConnection::new(&endpoint.address, self.http_client.clone(), &self.options);
                Ok(Arc::new(conn))
            }
        }
    }
}

/// Runs one call under the caller's token and an optional deadline.
///
/// The token is checked once, before `fut` is first polled, so nothing is
/// sent after cancellation. Once started the call runs to completion or to
/// the deadline.
pub(crate) async fn guard_call<T, F>(token: &CancellationToken, timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(FanrpcError::Cancelled);
    }

    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| FanrpcError::Timeout(timeout.as_millis() as u64))?,
        None => fut.await,
    }
}
