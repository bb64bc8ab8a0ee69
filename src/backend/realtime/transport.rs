//! Notification Transport
//!
//! The push path needs four things from the store: a way to open a
//! listening connection, listen/unlisten on that connection, receive
//! notifications from it, and publish to a channel. These traits capture
//! exactly that, so the subscriber and publisher can run over Postgres
//! LISTEN/NOTIFY in production and over [`MemoryTransport`] in tests and
//! single-process deployments.
//!
//! Delivery is at-most-once and best-effort: a notification published
//! while a listener is disconnected is gone.
//!
//! [`MemoryTransport`]: crate::backend::realtime::memory::MemoryTransport

use async_trait::async_trait;
use thiserror::Error;

/// A notification as received from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the notification was published on
    pub channel: String,
    /// Raw payload
    pub payload: String,
}

impl Notification {
    /// Create a notification
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish a connection
    #[error("connect failed: {0}")]
    Connect(String),

    /// The connection was closed or found dead
    #[error("connection closed")]
    Closed,

    /// I/O or protocol failure on an open connection
    #[error("transport failure: {0}")]
    Io(String),

    /// Database driver failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Factory for listening connections
#[async_trait]
pub trait NotifyTransport: Send + Sync + 'static {
    /// Connection type produced by [`NotifyTransport::connect`]
    type Connection: TransportConnection;

    /// Open a fresh connection with no channels listened
    async fn connect(&self) -> Result<Self::Connection, TransportError>;
}

/// One listening connection
///
/// Owned by a single task; never shared.
#[async_trait]
pub trait TransportConnection: Send + 'static {
    /// Start listening on a channel. Listening twice is harmless.
    async fn listen(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Stop listening on a channel
    async fn unlisten(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Wait for the next notification
    ///
    /// Must be cancel-safe: dropping the future before it resolves must
    /// not lose a notification that has not been returned yet.
    async fn recv(&mut self) -> Result<Notification, TransportError>;

    /// Cheap round-trip used to detect a silently dead connection
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Release the connection
    async fn close(&mut self);
}

/// Publish side of the transport
#[async_trait]
pub trait PublishTransport: Send + Sync + 'static {
    /// Publish a payload to every listener currently on `channel`
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError>;
}
