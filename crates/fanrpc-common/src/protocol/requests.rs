use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

pub type RequestId = u64;
/// `"Service.Method"` name of the procedure to invoke.
pub type ServiceMethod = String;
pub type RpcArgs = serde_json::Value;

/// One call frame.
///
/// `timeout_ms` is a hint for the server; the client enforces its own
/// deadline independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub service_method: ServiceMethod,
    pub args: RpcArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Request {
    pub fn new(service_method: impl Into<String>, args: RpcArgs) -> Self {
        Request {
            id: next_request_id(),
            service_method: service_method.into(),
            args,
            timeout_ms: None,
        }
    }

    pub fn with_timeout(self, timeout_ms: u64) -> Self {
        Request {
            timeout_ms: Some(timeout_ms),
            ..self
        }
    }

    /// Splits `service_method` at its last dot.
    ///
    /// Returns `None` unless both halves are non-empty.
    pub fn split_service_method(&self) -> Option<(&str, &str)> {
        match self.service_method.rsplit_once('.')? {
            ("", _) | (_, "") => None,
            halves => Some(halves),
        }
    }
}

/// Ids are unique per process and unlikely to collide across restarts: the
/// counter starts from the wall clock at first use.
fn next_request_id() -> RequestId {
    static NEXT: OnceLock<AtomicU64> = OnceLock::new();
    NEXT.get_or_init(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        AtomicU64::new(seed << 16)
    })
    .fetch_add(1, Ordering::Relaxed)
}
