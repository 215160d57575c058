use thiserror::Error;

use crate::classify::ErrorCode;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by the enqueue and dispatch paths
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("OJS client not configured")]
    NotConfigured,

    #[error("malformed configuration: {0}")]
    MalformedConfiguration(String),

    #[error("job type must be a non-empty string")]
    EmptyJobType,

    #[error("cannot resolve handler '{class_name}' for job type '{job_type}'")]
    DispatchResolution { class_name: String, job_type: String },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for backend client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Closed transport/backend error taxonomy. The client maps whatever its
/// wire protocol produces into one of these variants; the classifier
/// consumes them without inspecting anything open-ended.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Open or read timeout on the request
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection refused or reset
    #[error("connection failed: {0}")]
    Connection(String),

    /// Error the backend itself marked as retryable
    #[error("backend retryable error ({code}): {message}")]
    Retryable { code: ErrorCode, message: String },

    /// The backend rejected the envelope as invalid
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backend reported a conflicting or duplicate job
    #[error("duplicate job: {0}")]
    Duplicate(String),

    #[error("{0}")]
    Other(String),
}
