//! Notification Payload
//!
//! The flat value carried on a push channel. It names the changed
//! conversation and record but never carries content: receivers read the
//! record back through the store.
//!
//! # Wire format
//!
//! ```json
//! {"v":1,"kind":"direct","conversation_id":"c1","record_id":"6f1c...-..."}
//! ```
//!
//! `v` is reserved for future revisions and defaults to 1 when absent.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation::{ConversationId, ConversationIdentity, ConversationKind};
use super::error::SharedError;

/// Current payload revision
pub const PAYLOAD_VERSION: u16 = 1;

fn default_version() -> u16 {
    PAYLOAD_VERSION
}

/// Push notification describing a changed conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPayload {
    /// Payload revision
    #[serde(rename = "v", default = "default_version")]
    pub version: u16,
    /// Conversation kind
    pub kind: ConversationKind,
    /// Conversation id
    pub conversation_id: ConversationId,
    /// Id of the record that changed
    pub record_id: Uuid,
}

impl NotificationPayload {
    /// Payload for a record written to `conversation`
    pub fn new(conversation: &ConversationIdentity, record_id: Uuid) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            kind: conversation.kind,
            conversation_id: conversation.id.clone(),
            record_id,
        }
    }

    /// The conversation this payload refers to
    pub fn conversation(&self) -> ConversationIdentity {
        ConversationIdentity::new(self.kind, self.conversation_id.clone())
    }

    /// Serialize to the wire string
    pub fn encode(&self) -> Result<String, SharedError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a wire string
    ///
    /// Unknown revisions and empty conversation ids are rejected.
    pub fn decode(raw: &str) -> Result<Self, SharedError> {
        let payload: Self = serde_json::from_str(raw)?;
        if payload.version == 0 || payload.version > PAYLOAD_VERSION {
            return Err(SharedError::validation(
                "v",
                format!("unsupported payload version {}", payload.version),
            ));
        }
        if payload.conversation_id.is_empty() {
            return Err(SharedError::validation(
                "conversation_id",
                "must not be empty",
            ));
        }
        Ok(payload)
    }
}
