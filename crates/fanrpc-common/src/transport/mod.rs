//! fanrpc Transport Layer
//!
//! Length-prefixed JSON over TCP.
//!
//! # Components
//!
//! - **[`JsonCodec`]**: Encode/decode protocol messages to JSON
//! - **[`TcpTransportAsync`]**: Async TCP client transport (used by TCP connections)
//! - **[`TcpServer`]**: Async TCP server (used by the demo server and tests)
//!
//! # Wire Format
//!
//! ```text
//! [4-byte length as u32 big-endian] [JSON data]
//! ```
//!
//! Frames larger than [`MAX_MESSAGE_SIZE`] are rejected on both sides.
//!
//! # Example
//!
//! ```no_run
//! use fanrpc_common::transport::TcpTransportAsync;
//! use fanrpc_common::protocol::Request;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = TcpTransportAsync::new();
//! let mut stream = transport.connect("127.0.0.1:8080").await?;
//!
//! let request = Request::new("Arith.Sum", json!({"a": 1, "b": 2}));
//! let response = transport.send_request(&mut stream, &request).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod tcp;
pub mod tcp_server;

pub use codec::JsonCodec;
pub use tcp::TcpTransportAsync;
pub use tcp_server::TcpServer;

/// Maximum frame size accepted by either side (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;
