pub mod error;
pub mod jsonrpc;
pub mod requests;
pub mod responses;

#[cfg(test)]
mod tests;

pub use error::{FanrpcError, Result};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use requests::{Request, RequestId, ServiceMethod, RpcArgs};
pub use responses::{Response, RpcResult};
