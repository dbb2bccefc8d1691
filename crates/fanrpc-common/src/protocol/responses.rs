use serde::{Deserialize, Serialize};

use super::error::{FanrpcError, Result};
use super::RequestId;

/// Reply payload of a call
pub type RpcResult = serde_json::Value;

/// Reply frame sent back for one [`Request`](super::Request).
///
/// Exactly one of `result` / `error` is set, matching `success`. Unset
/// fields are left out of the encoded frame.
///
/// ```
/// use fanrpc_common::protocol::Response;
/// use serde_json::json;
///
/// let ok = Response::success(7, json!(3));
/// assert_eq!(ok.into_result().unwrap(), json!(3));
///
/// let failed = Response::error(7, "division by zero");
/// assert!(failed.into_result().is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RpcResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

impl Response {
    pub fn success(id: RequestId, result: RpcResult) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
            success: true,
        }
    }

    pub fn error(id: RequestId, error: impl Into<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(error.into()),
            success: false,
        }
    }

    /// Builds the reply frame for a handler outcome.
    pub fn from_result(id: RequestId, outcome: Result<RpcResult>) -> Self {
        match outcome {
            Ok(result) => Response::success(id, result),
            Err(e) => Response::error(id, e.to_string()),
        }
    }

    /// Turns the frame back into the handler outcome seen by the caller.
    ///
    /// A failed frame becomes [`FanrpcError::Remote`]. A successful frame
    /// with no payload is malformed.
    pub fn into_result(self) -> Result<RpcResult> {
        match (self.success, self.result, self.error) {
            (true, Some(result), _) => Ok(result),
            (true, None, _) => Err(FanrpcError::InvalidResponse(format!(
                "response {} is marked successful but carries no result",
                self.id
            ))),
            (false, _, error) => Err(FanrpcError::Remote(error.unwrap_or_else(|| "unknown error".to_string()))),
        }
    }
}
