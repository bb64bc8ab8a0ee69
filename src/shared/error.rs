//! Shared Error Types
//!
//! Errors raised by the pure, transport-independent parts of the crate:
//! conversation identities, channel routing and payload encoding.
//!
//! # Error Categories
//!
//! - `InvalidIdentity` - A conversation identity that cannot be routed
//! - `SerializationError` - JSON serialization/deserialization failures
//! - `ValidationError` - Data validation failures
//!
//! # Usage
//!
//! ```rust
//! use xfpulse::shared::error::SharedError;
//!
//! let error = SharedError::invalid_identity("no conversation kind set");
//! assert!(error.to_string().contains("no conversation kind set"));
//! ```
use thiserror::Error;

/// Shared error types that can occur on both the write and the read side
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// Malformed conversation identity passed to the router
    #[error("Invalid conversation identity: {message}")]
    InvalidIdentity {
        /// Human-readable error message
        message: String,
    },

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new invalid identity error
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
