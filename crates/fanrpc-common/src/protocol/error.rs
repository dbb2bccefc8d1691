use thiserror::Error;

#[derive(Error, Debug)]
pub enum FanrpcError {
    /// Discovery has no endpoints to choose from.
    #[error("rpc discovery: no available servers")]
    NoAvailableServers,

    /// Opening a new connection to an endpoint failed.
    #[error("Dial error for {addr}: {reason}")]
    Dial { addr: String, reason: String },

    /// The registry round trip failed or returned an unreadable server list.
    #[error("Registry fetch error: {0}")]
    RegistryFetch(String),

    /// The server executed the call and reported an error.
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Call cancelled")]
    Cancelled,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl FanrpcError {
    /// Creates a dial error for `addr`.
    pub fn dial(addr: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        FanrpcError::Dial {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error means the underlying connection can no longer be used.
    ///
    /// Application errors, bad payloads and cancellation before a request
    /// was sent leave the connection intact.
    pub fn breaks_connection(&self) -> bool {
        matches!(
            self,
            FanrpcError::Transport(_)
                | FanrpcError::Timeout(_)
                | FanrpcError::ConnectionClosed
                | FanrpcError::Io(_)
                | FanrpcError::Connection(_)
        )
    }
}

impl From<std::net::AddrParseError> for FanrpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        FanrpcError::InvalidAddress(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FanrpcError>;
