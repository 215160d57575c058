//! Maps execution failures into the backend's closed error taxonomy.
//!
//! Classification is a total, ordered match over [`Failure`]; the first
//! matching category wins and the result is only a verdict. Logging and
//! reporting around it belong to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ClientError;

/// Backend error codes attached to failure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Timeout,
    ConnectionError,
    InvalidArguments,
    ValidationError,
    Duplicate,
    UnknownError,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::InvalidArguments => "invalid_arguments",
            Self::ValidationError => "validation_error",
            Self::Duplicate => "duplicate",
            Self::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure raised while executing or delivering a job
#[derive(Error, Debug, Clone)]
pub enum Failure {
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection error: {0}")]
    Connection(String),

    /// Failure the backend itself declared retryable, carrying its code
    #[error("backend retryable ({code}): {message}")]
    BackendRetryable { code: ErrorCode, message: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("{0}")]
    Other(String),
}

impl Failure {
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<ClientError> for Failure {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Timeout(msg) => Self::Timeout(msg),
            ClientError::Connection(msg) => Self::Connection(msg),
            ClientError::Retryable { code, message } => Self::BackendRetryable { code, message },
            ClientError::Validation(msg) => Self::Validation(msg),
            ClientError::Duplicate(msg) => Self::Duplicate(msg),
            ClientError::Other(msg) => Self::Other(msg),
        }
    }
}

/// Verdict returned by [`classify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub code: ErrorCode,
    pub retryable: bool,
}

/// Classify a failure. Pure and side-effect-free; never propagates.
pub fn classify(failure: &Failure) -> Classification {
    match failure {
        Failure::Timeout(_) => Classification { code: ErrorCode::Timeout, retryable: true },
        Failure::Connection(_) => Classification { code: ErrorCode::ConnectionError, retryable: true },
        Failure::BackendRetryable { code, .. } => Classification { code: *code, retryable: true },
        Failure::InvalidArguments(_) => {
            Classification { code: ErrorCode::InvalidArguments, retryable: false }
        }
        Failure::Validation(_) => {
            Classification { code: ErrorCode::ValidationError, retryable: false }
        }
        Failure::Duplicate(_) => Classification { code: ErrorCode::Duplicate, retryable: false },
        Failure::Other(_) => Classification { code: ErrorCode::UnknownError, retryable: false },
    }
}
