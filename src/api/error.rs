//! Error types for the TestOps API.

use std::time::Duration;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the remote API or the transport beneath it.
///
/// Errors are split into two groups that drive the retry policy:
/// - **Transient**: `Timeout`, `Network`, `Server`, `RateLimited`
/// - **Permanent**: everything else; retrying will not help
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 4xx other than auth, not-found and rate limiting.
    #[error("bad request (HTTP {status}): {message}")]
    BadRequest { status: u16, message: String },

    /// Token missing, invalid or lacking permission.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Project, run or endpoint does not exist.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Too many requests.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// 5xx response.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// The request did not complete in time.
    #[error("request timed out: {message}")]
    Timeout { message: String },

    /// Connection-level failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// Response body could not be decoded.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// The API answered 2xx but reported `status: false`.
    #[error("request rejected: {message}")]
    Rejected { message: String },

    /// Local I/O failure, e.g. reading an attachment.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Whether the error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Network { .. }
                | Self::Server { .. }
                | Self::RateLimited { .. }
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            Self::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}
