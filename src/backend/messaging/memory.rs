//! In-memory record store
//!
//! Keeps every record in a vector behind a mutex. Timestamps come from the
//! wall clock but are forced to increase by at least one microsecond per
//! append, so ordering never depends on clock resolution.
//!
//! The store can emulate the Postgres notify trigger by publishing on a
//! [`MemoryTransport`] while the append still holds the store lock.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, MutexGuard};

use super::store::RecordStore;
use crate::backend::error::RealtimeError;
use crate::backend::realtime::{ChannelRouter, MemoryTransport};
use crate::shared::{ChatRecord, ConversationIdentity, DraftRecord, NotificationPayload, Watermark};

#[derive(Debug, Default)]
struct Inner {
    records: Vec<ChatRecord>,
    last_timestamp: Option<DateTime<Utc>>,
    failures: usize,
}

/// Vector-backed [`RecordStore`]
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
    trigger: Option<MemoryTransport>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that publishes every append on `transport`, like the database
    /// trigger does
    pub fn with_trigger(transport: MemoryTransport) -> Self {
        Self {
            inner: Mutex::default(),
            trigger: Some(transport),
        }
    }

    /// Make the next `count` reads fail
    pub fn fail_next_queries(&self, count: usize) {
        self.lock().failures = count;
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sorted_for<'a>(inner: &'a Inner, conversation: &'a ConversationIdentity) -> Vec<&'a ChatRecord> {
        let mut records: Vec<&ChatRecord> = inner
            .records
            .iter()
            .filter(|r| &r.conversation == conversation)
            .collect();
        records.sort_by_key(|r| r.order_key());
        records
    }
}

impl Inner {
    fn take_failure(&mut self) -> Result<(), RealtimeError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(RealtimeError::transient("store unavailable"));
        }
        Ok(())
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn append(&self, draft: DraftRecord) -> Result<ChatRecord, RealtimeError> {
        let channel = ChannelRouter::channel_for(&draft.conversation)?;
        let mut inner = self.lock();

        let record = draft.into_record(inner.next_timestamp());
        inner.records.push(record.clone());

        if let Some(transport) = &self.trigger {
            let payload = NotificationPayload::new(&record.conversation, record.id).encode()?;
            transport.inject(channel.as_str(), &payload);
        }
        tracing::debug!("[Store] Appended {} to {}", record.id, record.conversation);
        Ok(record)
    }

    async fn records_after(
        &self,
        conversation: &ConversationIdentity,
        watermark: Watermark,
    ) -> Result<Vec<ChatRecord>, RealtimeError> {
        let mut inner = self.lock();
        inner.take_failure()?;

        Ok(Self::sorted_for(&inner, conversation)
            .into_iter()
            .filter(|r| watermark.admits(r))
            .cloned()
            .collect())
    }

    async fn latest(
        &self,
        conversation: &ConversationIdentity,
        limit: i64,
    ) -> Result<Vec<ChatRecord>, RealtimeError> {
        let mut inner = self.lock();
        inner.take_failure()?;

        let records = Self::sorted_for(&inner, conversation);
        let keep = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let skip = records.len().saturating_sub(keep);
        Ok(records.into_iter().skip(skip).cloned().collect())
    }
}
