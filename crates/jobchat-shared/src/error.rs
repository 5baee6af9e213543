use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The local user is not authenticated; nothing network-facing may start.
    #[error("Permission denied: {0}")]
    Permission(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("STOMP handshake failed: {0}")]
    Handshake(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Channel closed")]
    Closed,

    #[error("Server rejected the session: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("{endpoint}: request failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("{endpoint}: server answered {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{endpoint}: timed out")]
    Timeout { endpoint: String },

    #[error("{endpoint}: invalid response body: {reason}")]
    Body { endpoint: String, reason: String },
}

impl FetchError {
    /// Whether another attempt may succeed. Client errors other than 408/429
    /// are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request { .. } | FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            FetchError::Body { .. } => false,
        }
    }

    /// Whether the backend refused the caller as unauthenticated.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Status { status: 401 | 403, .. })
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    Timestamp(String),

    #[error("Invalid STOMP frame: {0}")]
    Frame(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),
}
