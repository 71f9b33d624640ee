use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use common::ErrorResponse;
use crypto::GrantError;
use drive::GatewayError;
use storage::StorageError;
use thiserror::Error;
use tracing::{error, warn};

/// Every failure an endpoint can report, with its HTTP mapping
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    QuotaExceeded(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("{0}")]
    InvalidSignedGrant(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::QuotaExceeded(_)
            | ServiceError::BackendUnavailable(_)
            | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidSignedGrant(_) | ServiceError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", self);
        } else {
            warn!(status = status.as_u16(), "{}", self);
        }
        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::QuotaExceeded { .. } => ServiceError::QuotaExceeded(err.to_string()),
            StorageError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            StorageError::Conflict(message) => ServiceError::BadRequest(message),
            StorageError::Backend(e) => handle_server_error("Metadata store failure", e),
        }
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            GatewayError::Unavailable(_) => ServiceError::BackendUnavailable(err.to_string()),
            other => handle_server_error("Storage provider failure", other),
        }
    }
}

impl From<GrantError> for ServiceError {
    fn from(err: GrantError) -> Self {
        ServiceError::InvalidSignedGrant(err.to_string())
    }
}

/// Helper function for bad request errors
pub fn handle_error<E: std::fmt::Display>(msg: &str, e: E) -> ServiceError {
    ServiceError::BadRequest(format!("{}: {}", msg, e))
}

/// Helper function for authentication errors
pub fn handle_auth_error<E: std::fmt::Display>(msg: &str, e: E) -> ServiceError {
    ServiceError::Unauthorized(format!("{}: {}", msg, e))
}

/// Helper function for server errors; the detail is logged, not returned
pub fn handle_server_error<E: std::fmt::Display>(msg: &str, e: E) -> ServiceError {
    error!("{}: {}", msg, e);
    ServiceError::Internal(msg.to_string())
}
