//! Error types for the compression orchestrator

use crate::api::ApiError;
use thiserror::Error;

/// Result type for compression operations
pub type CompressResult<T> = Result<T, CompressError>;

/// Message shown when a failure carries no text of its own
pub const FALLBACK_MESSAGE: &str = "Failed to compress file";

/// Compression error types
#[derive(Debug, Clone, Error)]
pub enum CompressError {
    /// Initial upload failed at the network level
    #[error("HTTP request failed: {0}")]
    Network(String),

    /// Initial upload answered with a non-2xx status
    #[error("Backend error: {status} - {body}")]
    Submission { status: u16, body: String },

    /// Upload accepted at the HTTP level but refused by the service
    #[error("Compression failed")]
    Rejected,

    /// A status poll answered with a non-2xx status
    #[error("Failed to get job status: {0}")]
    StatusCheck(u16),

    /// Service marked the job as failed
    #[error("Job processing failed on server")]
    JobFailed,

    /// Poll ceiling reached without a terminal job state
    #[error("Job processing timeout after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Response body missing required fields or of the wrong shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Batch response ended before this file's entry
    #[error("No result returned for file {index}")]
    MissingResult { index: usize },

    /// Caller cancelled the operation
    #[error("Compression cancelled")]
    Cancelled,

    /// Input file could not be read
    #[error("Failed to read input file: {0}")]
    FileRead(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl CompressError {
    /// Poll ceiling exhausted, as opposed to a failure reported by the service
    pub fn is_timeout(&self) -> bool {
        matches!(self, CompressError::Timeout { .. })
    }

    /// Failure explicitly reported by the service for this job
    pub fn is_server_reported(&self) -> bool {
        matches!(self, CompressError::JobFailed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CompressError::Cancelled)
    }

    /// Human-readable message for the caller callback
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            FALLBACK_MESSAGE.to_string()
        } else {
            message
        }
    }

    /// Classify an error from the initial upload request
    pub fn from_submission(err: ApiError) -> Self {
        match err {
            ApiError::Status { status, body } => CompressError::Submission { status, body },
            other => other.into(),
        }
    }

    /// Classify an error from a status poll
    pub fn from_poll(err: ApiError) -> Self {
        match err {
            ApiError::Status { status, .. } => CompressError::StatusCheck(status),
            other => other.into(),
        }
    }
}

impl From<ApiError> for CompressError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http(msg) => CompressError::Network(msg),
            ApiError::Status { status, body } => CompressError::Submission { status, body },
            ApiError::Decode(msg) => CompressError::Malformed(msg),
            ApiError::Io(msg) => CompressError::FileRead(msg),
            ApiError::InvalidUrl(msg) => CompressError::Other(msg),
        }
    }
}

impl From<std::io::Error> for CompressError {
    fn from(err: std::io::Error) -> Self {
        CompressError::FileRead(err.to_string())
    }
}
