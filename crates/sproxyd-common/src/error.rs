//! Error types for the sproxyd object server
//!
//! This module defines the common error type used throughout the system.

use crate::types::PolicyIndex;
use thiserror::Error;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type
#[derive(Debug, Error)]
pub enum Error {
    // Policy configuration errors
    #[error("malformed storage policy configuration: {0}")]
    ConfigurationParse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage policy not found: {0}")]
    PolicyNotFound(PolicyIndex),

    // Backend errors
    #[error("failed to connect to backend {endpoint}: {reason}")]
    BackendConnect { endpoint: String, reason: String },

    #[error("backend request timed out: {0}")]
    BackendTimeout(String),

    #[error("backend returned status {status} for {url}")]
    Backend { status: u16, url: String },

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    // DiskFile errors
    #[error("diskfile deleted: {0}")]
    DiskFileDeleted(String),

    #[error("diskfile expired: {name} (x-delete-at {delete_at})")]
    DiskFileExpired { name: String, delete_at: u64 },

    #[error("diskfile not open")]
    DiskFileNotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Request errors
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a policy document parse error
    pub fn configuration_parse(msg: impl Into<String>) -> Self {
        Self::ConfigurationParse(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a retryable error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendConnect { .. } | Self::BackendTimeout(_))
    }

    /// Get the HTTP status code the object server answers with
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidRequest(_) => 400,

            // 404 Not Found
            Self::ObjectNotFound(_) | Self::DiskFileDeleted(_) | Self::DiskFileExpired { .. } => {
                404
            }

            // 500 Internal Server Error
            Self::ConfigurationParse(_)
            | Self::Configuration(_)
            | Self::DiskFileNotOpen
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_)
            | Self::Backend { .. } => 500,

            // 503 Service Unavailable
            Self::PolicyNotFound(_) | Self::BackendConnect { .. } | Self::BackendTimeout(_) => 503,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
