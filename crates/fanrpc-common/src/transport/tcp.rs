use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{Request, Response};
use crate::protocol::error::{FanrpcError, Result};
use crate::transport::codec::JsonCodec;
use crate::transport::MAX_MESSAGE_SIZE;

/// Default timeout for establishing a TCP connection (10 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Async TCP transport for fanrpc.
///
/// Connects to servers and exchanges length-prefixed JSON frames:
///
/// ```text
/// [4-byte length] [JSON data]
/// ```
///
/// # Example
///
/// ```no_run
/// use fanrpc_common::transport::TcpTransportAsync;
/// use fanrpc_common::protocol::Request;
/// use serde_json::json;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpTransportAsync::new().with_connect_timeout(Duration::from_secs(2));
/// let mut stream = transport.connect("127.0.0.1:8080").await?;
///
/// let request = Request::new("Echo.Echo", json!("hello"));
/// let response = transport.send_request(&mut stream, &request).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransportAsync {
    connect_timeout: Duration,
}

impl TcpTransportAsync {
    /// Creates a transport with the default connect timeout.
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connects to a remote endpoint.
    ///
    /// Resolves `addr` (which may yield several socket addresses) and tries
    /// each until one accepts. The whole attempt is bounded by the connect
    /// timeout.
    ///
    /// # Errors
    ///
    /// - `Timeout` if no address accepted within the connect timeout
    /// - `Connection` if the address cannot be resolved or every attempt failed
    pub async fn connect(&self, addr: &str) -> Result<TcpStream> {
        let timeout = self.connect_timeout;
        tokio::time::timeout(timeout, Self::connect_any(addr))
            .await
            .map_err(|_| FanrpcError::Timeout(timeout.as_millis() as u64))?
    }

    async fn connect_any(addr: &str) -> Result<TcpStream> {
        let socket_addrs = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| FanrpcError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect(socket_addr).await {
                Ok(stream) => {
                    // Frames are small and latency-bound
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(e) => {
                    last_err = Some(e);
                }
            }
        }

        Err(FanrpcError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Sends a request and waits for its response.
    pub async fn send_request(&self, stream: &mut TcpStream, request: &Request) -> Result<Response> {
        let encoded = JsonCodec::encode_request(request)?;
        Self::write_frame(stream, &encoded).await?;

        let response_data = Self::read_frame(stream).await?.ok_or_else(|| {
            FanrpcError::Connection("reading response: connection closed by peer".to_string())
        })?;
        let response = JsonCodec::decode_response(&response_data)?;

        if response.id != request.id && response.id != 0 {
            return Err(FanrpcError::InvalidResponse(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }

        Ok(response)
    }

    /// Writes one length-prefixed frame and flushes it.
    ///
    /// Prefix and body go out in a single write.
    pub async fn write_frame<W>(stream: &mut W, data: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let len = u32::try_from(data.len())
            .ok()
            .filter(|&len| len as usize <= MAX_MESSAGE_SIZE)
            .ok_or_else(|| {
                FanrpcError::InvalidRequest(format!(
                    "Message too large: {} bytes (max {} bytes)",
                    data.len(),
                    MAX_MESSAGE_SIZE
                ))
            })?;

        let mut frame = Vec::with_capacity(4 + data.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(data);

        stream.write_all(&frame).await.map_err(|e| io_error(e, "writing frame"))?;
        stream.flush().await.map_err(|e| io_error(e, "flushing stream"))
    }

    /// Reads one length-prefixed frame.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly before a new
    /// frame started.
    pub async fn read_frame<R>(stream: &mut R) -> Result<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(io_error(e, "reading length prefix")),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(FanrpcError::InvalidResponse(format!(
                "Message too large: {} bytes (max {} bytes)",
                len, MAX_MESSAGE_SIZE
            )));
        }

        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.map_err(|e| io_error(e, "reading body"))?;

        Ok(Some(buf))
    }
}

/// Sorts io failures into the variants callers act on: lost connections
/// and stalls poison the stream, anything else is reported as-is.
fn io_error(err: std::io::Error, context: &str) -> FanrpcError {
    use std::io::ErrorKind::*;

    match err.kind() {
        TimedOut | WouldBlock => FanrpcError::Transport(format!("{}: timed out", context)),
        ConnectionReset | ConnectionAborted | BrokenPipe | UnexpectedEof | NotConnected => {
            FanrpcError::Connection(format!("{}: connection lost", context))
        }
        _ => FanrpcError::Io(err),
    }
}

impl Default for TcpTransportAsync {
    fn default() -> Self {
        Self::new()
    }
}
