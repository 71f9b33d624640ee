use thiserror::Error;

/// Failures of the provider's management API (folders, metadata, permissions)
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Object {0} not found at the storage provider")]
    NotFound(String),
    #[error("Storage provider unavailable: {0}")]
    Unavailable(String),
    #[error("Storage provider returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Storage provider request failed: {0}")]
    Transport(String),
    #[error("Unexpected storage provider response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Failures of a single probe or chunk PUT against a resumable session.
/// Transports never retry on their own; callers decide with `is_retryable`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// No response at all (connection reset, DNS, timeout)
    #[error("Network error: {0}")]
    Network(String),
    #[error("Storage provider error (HTTP {status})")]
    Server { status: u16 },
    #[error("Storage provider rejected the transfer (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Only network failures and 5xx responses are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Network(_) | TransferError::Server { .. })
    }

    pub fn from_status(status: u16, body: String) -> Self {
        if (500..600).contains(&status) {
            TransferError::Server { status }
        } else {
            TransferError::Rejected { status, body }
        }
    }
}
