//! Conversation Timeline
//!
//! Consumer-side state for one open conversation view. Records can reach a
//! view more than once (a push-triggered refresh and a poll batch racing
//! each other, or a trigger and an application publish for the same
//! write), so merging is idempotent by record id.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::conversation::ConversationIdentity;
use super::record::{ChatRecord, Watermark};

/// Ordered, duplicate-free list of records for a single conversation
#[derive(Debug, Clone)]
pub struct ConversationTimeline {
    conversation: ConversationIdentity,
    by_order: BTreeMap<(DateTime<Utc>, Uuid), ChatRecord>,
    by_id: HashMap<Uuid, DateTime<Utc>>,
}

impl ConversationTimeline {
    /// Empty timeline for a conversation
    pub fn new(conversation: ConversationIdentity) -> Self {
        Self {
            conversation,
            by_order: BTreeMap::new(),
            by_id: HashMap::new(),
        }
    }

    /// Timeline seeded with an initial load
    pub fn with_records(conversation: ConversationIdentity, records: Vec<ChatRecord>) -> Self {
        let mut timeline = Self::new(conversation);
        timeline.merge(records);
        timeline
    }

    /// Conversation this timeline shows
    pub fn conversation(&self) -> &ConversationIdentity {
        &self.conversation
    }

    /// Merge records, skipping ids already present and records of other
    /// conversations. Returns how many records were inserted.
    pub fn merge(&mut self, records: impl IntoIterator<Item = ChatRecord>) -> usize {
        let mut inserted = 0;
        for record in records {
            if record.conversation != self.conversation || self.by_id.contains_key(&record.id) {
                continue;
            }
            self.by_id.insert(record.id, record.created_at);
            self.by_order.insert(record.order_key(), record);
            inserted += 1;
        }
        inserted
    }

    /// Whether a record id is already shown
    pub fn contains(&self, id: &Uuid) -> bool {
        self.by_id.contains_key(id)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the timeline is empty
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Records in `(created_at, id)` order
    pub fn records(&self) -> impl Iterator<Item = &ChatRecord> {
        self.by_order.values()
    }

    /// Newest record, if any
    pub fn newest(&self) -> Option<&ChatRecord> {
        self.by_order.values().next_back()
    }

    /// Watermark for a read-after-notify fetch
    pub fn watermark(&self) -> Watermark {
        self.newest()
            .map(|r| Watermark::at(r.created_at))
            .unwrap_or(Watermark::BEGINNING)
    }
}
