//! Error types for Dependency-Track API calls.
//!
//! Failures are classified so callers can tell transport problems (the
//! server could not be reached or answered with a non-success status they
//! cannot act on) apart from typed API rejections (not found, conflict,
//! validation).

use thiserror::Error;

/// Error returned by a Dependency-Track API call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The requested entity does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The entity already exists or the change conflicts with remote state (HTTP 409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request was rejected as invalid (HTTP 400 / 422).
    #[error("validation failed (status {status}): {detail}")]
    Validation { status: u16, detail: String },

    /// The API key was rejected (HTTP 401 / 403).
    #[error("authentication failed (status {status}): {detail}")]
    Unauthorized { status: u16, detail: String },

    /// Server-side failure (HTTP 5xx).
    #[error("server error (status {status}): {detail}")]
    Server { status: u16, detail: String },

    /// Any other non-success status.
    #[error("unexpected response (status {status}): {detail}")]
    UnexpectedStatus { status: u16, detail: String },

    /// The server was unreachable.
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The response body could not be decoded.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Client configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reads kept failing after all retry attempts.
    #[error("max retries exceeded after {attempts} attempt(s): {message}")]
    MaxRetriesExceeded { attempts: u32, message: String },
}

/// Result alias for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Whether the error is a transient condition that a read may retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Unreachable(_) | ApiError::Timeout(_))
            || matches!(self, ApiError::UnexpectedStatus { status: 429, .. })
    }

    /// Whether the error is a server-side (5xx) failure.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Server { .. })
    }

    /// Whether the failure happened below the API layer: the server could
    /// not be reached, timed out, or answered with something unusable.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::Unreachable(_)
                | ApiError::Timeout(_)
                | ApiError::Server { .. }
                | ApiError::UnexpectedStatus { .. }
                | ApiError::Unauthorized { .. }
                | ApiError::Parse(_)
                | ApiError::MaxRetriesExceeded { .. }
        )
    }

    /// HTTP status associated with the error, when there is one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::Validation { status, .. }
            | ApiError::Unauthorized { status, .. }
            | ApiError::Server { status, .. }
            | ApiError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Map a non-success HTTP status and body to a typed error.
    #[must_use]
    pub fn from_status(status: u16, detail: String) -> Self {
        match status {
            404 => ApiError::NotFound(detail),
            409 => ApiError::Conflict(detail),
            400 | 422 => ApiError::Validation { status, detail },
            401 | 403 => ApiError::Unauthorized { status, detail },
            500..=599 => ApiError::Server { status, detail },
            _ => ApiError::UnexpectedStatus { status, detail },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            ApiError::Unreachable(e.to_string())
        } else if e.is_decode() {
            ApiError::Parse(e.to_string())
        } else {
            ApiError::Unreachable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Parse(e.to_string())
    }
}
