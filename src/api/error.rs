//! Error types for the compression service client

use thiserror::Error;

/// Result type for API calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by [`crate::api::Client`]
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request never produced a response (connect, TLS, body stream)
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-2xx status
    #[error("Backend error: {status} - {body}")]
    Status { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Local file could not be read or written
    #[error("I/O error: {0}")]
    Io(String),

    /// URL could not be built from the configured base
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Create a status error
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            body: body.into(),
        }
    }

    /// HTTP status code, if the server answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Io(err.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::InvalidUrl(err.to_string())
    }
}
