use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::{FanrpcError, Result};
use crate::protocol::{Request, Response};
use crate::transport::MAX_MESSAGE_SIZE;

/// JSON body codec for frames on the TCP transport.
///
/// Bodies above [`MAX_MESSAGE_SIZE`] are refused in both directions, so a
/// peer can never make the other side buffer an unbounded message.
///
/// ```
/// use fanrpc_common::transport::JsonCodec;
/// use fanrpc_common::protocol::Request;
/// use serde_json::json;
///
/// let request = Request::new("Echo.Echo", json!({"n": 42}));
/// let body = JsonCodec::encode_request(&request).unwrap();
/// assert_eq!(JsonCodec::decode_request(&body).unwrap(), request);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Serializes any message into a frame body.
    pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(message)?;
        check_size(body.len())?;
        Ok(body)
    }

    /// Parses a frame body.
    pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
        check_size(body.len())?;
        Ok(serde_json::from_slice(body)?)
    }

    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Self::encode(request)
    }

    pub fn decode_request(body: &[u8]) -> Result<Request> {
        Self::decode(body)
    }

    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Self::encode(response)
    }

    pub fn decode_response(body: &[u8]) -> Result<Response> {
        Self::decode(body)
    }
}

fn check_size(len: usize) -> Result<()> {
    if len > MAX_MESSAGE_SIZE {
        return Err(FanrpcError::InvalidRequest(format!(
            "Message too large: {} bytes (max {} bytes)",
            len, MAX_MESSAGE_SIZE
        )));
    }
    Ok(())
}
