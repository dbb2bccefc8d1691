//! fanrpc Common Types and Transport
//!
//! This crate provides the protocol definitions, the error type and the TCP
//! transport layer shared by the fanrpc crates.
//!
//! # Overview
//!
//! fanrpc is a client-side layer for calling remote procedures across a
//! changing set of servers. This crate contains the pieces every other crate
//! builds on:
//!
//! - **Protocol Layer**: Request/Response types, JSON-RPC 2.0 envelopes, error handling
//! - **Transport Layer**: length-prefixed JSON over TCP, plus a small TCP server
//!
//! # Wire format
//!
//! - **Transport**: TCP with keep-alive connections
//! - **Serialization**: JSON
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Max Message Size**: 100 MB
//!
//! # Example
//!
//! ```no_run
//! use fanrpc_common::{Request, Response};
//! use serde_json::json;
//!
//! let request = Request::new("Arith.Sum", json!({"a": 1, "b": 2}))
//!     .with_timeout(5000);
//!
//! let response = Response::success(request.id, json!(3));
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
