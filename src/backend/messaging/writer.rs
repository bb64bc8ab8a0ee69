//! Write path with dual dispatch
//!
//! `send` appends the record durably and then, in application publish
//! mode, pushes a notification through the [`Publisher`]. In trigger mode
//! the store emits the notification itself. Either way the return value
//! only reflects the durable write.

use std::sync::Arc;

use super::store::RecordStore;
use crate::backend::error::RealtimeError;
use crate::backend::realtime::{ChannelRouter, Publisher};
use crate::shared::{ChatRecord, ConversationIdentity, DraftRecord, PublishMode};

/// Writes chat records and announces them
#[derive(Clone)]
pub struct MessageWriter {
    store: Arc<dyn RecordStore>,
    publisher: Publisher,
    mode: PublishMode,
}

impl MessageWriter {
    pub fn new(store: Arc<dyn RecordStore>, publisher: Publisher, mode: PublishMode) -> Self {
        Self {
            store,
            publisher,
            mode,
        }
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    /// Store a message and announce it
    ///
    /// Fails only if the identity is invalid or the store rejects the
    /// write. Publish failures are swallowed by the [`Publisher`].
    pub async fn send(
        &self,
        conversation: &ConversationIdentity,
        sender: &str,
        body: &str,
    ) -> Result<ChatRecord, RealtimeError> {
        ChannelRouter::channel_for(conversation)?;

        let record = self
            .store
            .append(DraftRecord::new(conversation.clone(), sender, body))
            .await?;
        tracing::info!("[Writer] Stored {} in {}", record.id, conversation);

        if self.mode == PublishMode::Application {
            self.publisher.publish(&record.conversation, record.id).await;
        }
        Ok(record)
    }
}
