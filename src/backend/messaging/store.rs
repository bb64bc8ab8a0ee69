//! Record store interface
//!
//! The single consistent read API of the layer: the poller, the initial
//! load and push-triggered refreshes all read through it.

use async_trait::async_trait;

use crate::backend::error::RealtimeError;
use crate::shared::{ChatRecord, ConversationIdentity, DraftRecord, Watermark};

/// Durable chat record storage
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Store a draft and assign its timestamp
    ///
    /// Timestamps assigned by one store never decrease.
    async fn append(&self, draft: DraftRecord) -> Result<ChatRecord, RealtimeError>;

    /// Records of `conversation` strictly newer than `watermark`, ascending
    /// by `(created_at, id)`
    async fn records_after(
        &self,
        conversation: &ConversationIdentity,
        watermark: Watermark,
    ) -> Result<Vec<ChatRecord>, RealtimeError>;

    /// The newest `limit` records of `conversation`, ascending by
    /// `(created_at, id)`
    async fn latest(
        &self,
        conversation: &ConversationIdentity,
        limit: i64,
    ) -> Result<Vec<ChatRecord>, RealtimeError>;
}
