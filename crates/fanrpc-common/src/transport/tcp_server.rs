use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{Request, Response};
use crate::protocol::error::{FanrpcError, Result};
use crate::transport::codec::JsonCodec;
use crate::transport::tcp::TcpTransportAsync;

/// Async TCP server speaking the length-prefixed JSON protocol.
///
/// Each accepted connection is served on its own task and may carry any
/// number of sequential requests (keep-alive).
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Binds to `bind_addr`, e.g. `"0.0.0.0:9001"` or `"127.0.0.1:0"`.
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| FanrpcError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| FanrpcError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Runs the server until `shutdown` is cancelled.
    ///
    /// Cancelling also drops every open client connection, so clients see
    /// their streams close.
    pub async fn run_until<F, Fut>(&self, handler: F, shutdown: CancellationToken) -> Result<()>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                accepted = self.listener.accept() => accepted
                    .map_err(|e| FanrpcError::Connection(format!("Failed to accept connection: {}", e)))?,
            };

            debug!(peer = %peer_addr, "Connection established");

            let handler = handler.clone();
            let shutdown = shutdown.child_token();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!(peer = %peer_addr, "Dropping connection on shutdown");
                    }
                    result = handle_connection(stream, handler) => {
                        if let Err(e) = result {
                            warn!(peer = %peer_addr, error = %e, "Connection error");
                        }
                    }
                }
            });
        }
    }
}

/// Serves sequential requests on one connection until the peer closes it.
async fn handle_connection<F, Fut>(mut stream: TcpStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    while let Some(body) = TcpTransportAsync::read_frame(&mut stream).await? {
        let response = respond(&body, handler.as_ref()).await;
        send_response(&mut stream, &response).await?;
    }
    debug!("Connection closed by peer");
    Ok(())
}

/// Runs one frame through the handler. Undecodable frames are answered
/// with id 0 since the caller's id is unknown.
async fn respond<F, Fut>(body: &[u8], handler: &F) -> Response
where
    F: Fn(Request) -> Fut,
    Fut: Future<Output = Result<Response>>,
{
    let request = match JsonCodec::decode_request(body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Failed to decode request");
            return Response::error(0, e.to_string());
        }
    };

    let id = request.id;
    handler(request)
        .await
        .unwrap_or_else(|e| Response::from_result(id, Err(e)))
}

async fn send_response(stream: &mut TcpStream, response: &Response) -> Result<()> {
    let encoded = JsonCodec::encode_response(response)?;
    TcpTransportAsync::write_frame(stream, &encoded).await
}
