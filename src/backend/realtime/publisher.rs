//! Publisher
//!
//! Best-effort push after a durable write. The write has already
//! succeeded when `publish` runs, so nothing here is ever reported to the
//! caller: a lost push only costs latency, the poll path still delivers
//! the record.

use std::sync::Arc;
use uuid::Uuid;

use super::router::ChannelRouter;
use super::transport::PublishTransport;
use crate::shared::{ConversationIdentity, NotificationPayload};

/// Fire-and-forget change notifier
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn PublishTransport>,
}

impl Publisher {
    /// Create a publisher over a transport
    pub fn new(transport: Arc<dyn PublishTransport>) -> Self {
        Self { transport }
    }

    /// Announce that `record_id` was written to `conversation`
    ///
    /// Returns `true` if the transport accepted the notification. Failures
    /// are logged and swallowed.
    pub async fn publish(&self, conversation: &ConversationIdentity, record_id: Uuid) -> bool {
        let channel = match ChannelRouter::channel_for(conversation) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!("[Publisher] Cannot route {}: {}", conversation, e);
                return false;
            }
        };
        let payload = match NotificationPayload::new(conversation, record_id).encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("[Publisher] Cannot encode payload for {}: {}", record_id, e);
                return false;
            }
        };

        match self.transport.publish(channel.as_str(), &payload).await {
            Ok(()) => {
                tracing::debug!("[Publisher] Published {} on {}", record_id, channel);
                true
            }
            Err(e) => {
                tracing::warn!(
                    "[Publisher] Push for {} on {} dropped, poll path will deliver it: {}",
                    record_id,
                    channel,
                    e
                );
                false
            }
        }
    }
}
