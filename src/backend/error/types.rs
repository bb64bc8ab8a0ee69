/**
 * Backend Error Types
 *
 * This module defines the error type of the propagation layer.
 *
 * # Error Categories
 *
 * ## Connection Errors
 *
 * `ConnectError` is returned by `ChannelSubscriber::start()` when the first
 * transport connection cannot be established. It is the only transport
 * failure a caller ever sees; the caller decides whether to retry.
 *
 * ## Usage Errors
 *
 * `NotStarted` and `InvalidIdentity` signal programmer errors: subscribing
 * before `start()`, or routing a malformed conversation identity.
 *
 * ## Absorbed Errors
 *
 * `TransportTransient` and `CallbackError` describe failures that the
 * background workers absorb (reconnect, retry on next tick, log and move
 * on). They exist so those failures can be logged with a uniform shape.
 */

use thiserror::Error;
use crate::shared::SharedError;

/// Realtime layer error types
///
/// # Usage
///
/// ```rust
/// use xfpulse::backend::error::RealtimeError;
///
/// let err = RealtimeError::connect("connection refused");
/// assert!(err.to_string().contains("connection refused"));
/// ```
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Initial transport connection failed
    #[error("Connect error: {message}")]
    ConnectError {
        /// Human-readable error message
        message: String,
    },

    /// Operation requires a started subscriber
    #[error("Subscriber not started")]
    NotStarted,

    /// Mid-session transport failure (listen, publish, subscribe, probe)
    ///
    /// Never surfaced by the background workers; they recover by
    /// reconnecting or by dropping the notification.
    #[error("Transient transport error: {message}")]
    TransportTransient {
        /// Human-readable error message
        message: String,
    },

    /// Consumer callback failure, isolated per invocation
    #[error("Callback error: {message}")]
    CallbackError {
        /// Human-readable error message
        message: String,
    },

    /// Durable store failure
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Shared error (invalid identity, serialization, validation)
    #[error(transparent)]
    Shared(#[from] SharedError),
}

impl RealtimeError {
    /// Create a new connect error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::ConnectError {
            message: message.into(),
        }
    }

    /// Create a new transient transport error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransportTransient {
            message: message.into(),
        }
    }

    /// Create a new callback error
    pub fn callback(message: impl Into<String>) -> Self {
        Self::CallbackError {
            message: message.into(),
        }
    }

    /// Whether this error wraps an invalid conversation identity
    pub fn is_invalid_identity(&self) -> bool {
        matches!(self, Self::Shared(SharedError::InvalidIdentity { .. }))
    }

    /// Whether the background workers recover from this error on their own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransportTransient { .. } | Self::CallbackError { .. } | Self::Store(_)
        )
    }
}
