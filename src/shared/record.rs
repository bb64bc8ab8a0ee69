//! Chat Records and Watermarks
//!
//! A [`ChatRecord`] is the durable unit of truth: a stored message with a
//! store-assigned, monotonically increasing timestamp. A [`Watermark`]
//! remembers the newest timestamp a conversation view has already seen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::conversation::ConversationIdentity;

/// A stored chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRecord {
    /// Unique record ID
    pub id: Uuid,
    /// Conversation the record belongs to
    pub conversation: ConversationIdentity,
    /// Sender identifier (opaque)
    pub sender: String,
    /// Message body
    pub body: String,
    /// Store-assigned timestamp, used for ordering and watermarks
    pub created_at: DateTime<Utc>,
}

impl ChatRecord {
    /// Sort key used by the store and by consumers: `(created_at, id)`
    pub fn order_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }
}

/// A record that has not been written yet
///
/// The id is chosen by the writer so the publish payload can be built
/// without waiting for the store; the timestamp is assigned on append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRecord {
    /// Record ID
    pub id: Uuid,
    /// Target conversation
    pub conversation: ConversationIdentity,
    /// Sender identifier
    pub sender: String,
    /// Message body
    pub body: String,
}

impl DraftRecord {
    /// Create a draft with a fresh random id
    pub fn new(
        conversation: ConversationIdentity,
        sender: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation,
            sender: sender.into(),
            body: body.into(),
        }
    }

    /// Turn the draft into a stored record with the given timestamp
    pub fn into_record(self, created_at: DateTime<Utc>) -> ChatRecord {
        ChatRecord {
            id: self.id,
            conversation: self.conversation,
            sender: self.sender,
            body: self.body,
            created_at,
        }
    }
}

/// Newest record timestamp already delivered to a view
///
/// `None` is the "beginning of time" sentinel and orders before every
/// timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(Option<DateTime<Utc>>);

impl Watermark {
    /// Sentinel for a view that has seen nothing yet
    pub const BEGINNING: Watermark = Watermark(None);

    /// Watermark at a specific timestamp
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self(Some(timestamp))
    }

    /// Watermark after an initial load ordered by `(created_at, id)`
    pub fn from_records(records: &[ChatRecord]) -> Self {
        records
            .iter()
            .map(|r| r.created_at)
            .max()
            .map(Self::at)
            .unwrap_or(Self::BEGINNING)
    }

    /// The timestamp, or `None` for [`Watermark::BEGINNING`]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Whether a record is strictly newer than this watermark
    pub fn admits(&self, record: &ChatRecord) -> bool {
        match self.0 {
            Some(ts) => record.created_at > ts,
            None => true,
        }
    }

    /// Move forward to `timestamp`; never moves backwards
    pub fn advance_to(&mut self, timestamp: DateTime<Utc>) {
        if self.0.map_or(true, |current| timestamp > current) {
            self.0 = Some(timestamp);
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ts) => write!(f, "{}", ts.to_rfc3339()),
            None => f.write_str("beginning"),
        }
    }
}
