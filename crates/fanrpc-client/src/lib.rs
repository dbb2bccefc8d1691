//! fanrpc Client
//!
//! Calls remote procedures across a changing set of servers.
//!
//! - [`discovery`]: where the servers are ([`StaticDiscovery`],
//!   [`RegistryDiscovery`]) and which one to pick ([`SelectMode`])
//! - [`connection`]: how to talk to one server ([`TcpConnection`],
//!   [`HttpConnection`])
//! - [`pool`]: one cached connection per server, replaced when it dies
//! - [`dispatcher`]: single calls and fan-out broadcasts on top of the above

pub mod connection;
pub mod discovery;
pub mod dispatcher;
pub mod pool;

#[cfg(test)]
mod testing;

pub use connection::{
    Connection, DialOptions, Dialer, Endpoint, HttpConnection, Protocol, TcpConnection, TransportDialer,
};
pub use discovery::{Discovery, RegistryConfig, RegistryDiscovery, SelectMode, StaticDiscovery, SERVERS_HEADER};
pub use dispatcher::Dispatcher;
pub use pool::ConnectionPool;

pub use fanrpc_common::{FanrpcError, Result};
