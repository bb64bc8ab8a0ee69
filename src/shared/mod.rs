//! Shared Module
//!
//! Transport-independent types used by both the write side and the read
//! side of the propagation layer: conversation identities, stored records,
//! watermarks, the push payload and consumer-side timelines.
//!
//! Nothing in here performs I/O. All types are designed for serialization
//! and can be used from any thread.

/// Conversation identity (kind + opaque id)
pub mod conversation;

/// Stored records and watermarks
pub mod record;

/// Push notification payload
pub mod payload;

/// Consumer-side conversation state
pub mod timeline;

/// Shared error types
pub mod error;

/// Realtime configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use conversation::{ConversationId, ConversationIdentity, ConversationKind, ConversationSelector};
pub use record::{ChatRecord, DraftRecord, Watermark};
pub use payload::{NotificationPayload, PAYLOAD_VERSION};
pub use timeline::ConversationTimeline;
pub use error::SharedError;
pub use config::{ConfigError, PublishMode, RealtimeConfig, RealtimeConfigBuilder};
