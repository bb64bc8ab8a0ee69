//! Conversation Identity
//!
//! A conversation is addressed by its kind (direct chat, group or channel)
//! and an opaque id. The identity carries no reference to user, group or
//! channel model objects, only the id, so the realtime core never depends
//! on the types that own those objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::SharedError;

/// Kind of conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// One-to-one conversation between two users
    Direct,
    /// Group conversation
    Group,
    /// Broadcast channel
    Channel,
}

impl ConversationKind {
    /// All kinds, in wire order
    pub const ALL: [ConversationKind; 3] = [Self::Direct, Self::Group, Self::Channel];

    /// Wire and database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Channel => "channel",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationKind {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "private" => Ok(Self::Direct),
            "group" => Ok(Self::Group),
            "channel" => Ok(Self::Channel),
            other => Err(SharedError::invalid_identity(format!(
                "unknown conversation kind '{}'",
                other
            ))),
        }
    }
}

/// Opaque conversation id
///
/// Ids built from a [`Uuid`] are stored in simple form (no hyphens), so the
/// same conversation always produces the same id string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap an opaque id string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Uuid> for ConversationId {
    fn from(id: Uuid) -> Self {
        Self(id.simple().to_string())
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conversation identity: exactly one kind plus its id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationIdentity {
    /// Conversation kind
    pub kind: ConversationKind,
    /// Conversation id
    pub id: ConversationId,
}

impl ConversationIdentity {
    /// Create an identity from a kind and an id
    pub fn new(kind: ConversationKind, id: impl Into<ConversationId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Direct conversation
    pub fn direct(id: impl Into<ConversationId>) -> Self {
        Self::new(ConversationKind::Direct, id)
    }

    /// Group conversation
    pub fn group(id: impl Into<ConversationId>) -> Self {
        Self::new(ConversationKind::Group, id)
    }

    /// Channel conversation
    pub fn channel(id: impl Into<ConversationId>) -> Self {
        Self::new(ConversationKind::Channel, id)
    }
}

impl fmt::Display for ConversationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Parses `<kind>:<id>`, e.g. `direct:c1`
impl FromStr for ConversationIdentity {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or_else(|| {
            SharedError::invalid_identity(format!("expected '<kind>:<id>', got '{}'", s))
        })?;
        let kind = kind.parse()?;
        if id.is_empty() {
            return Err(SharedError::invalid_identity("conversation id is empty"));
        }
        Ok(Self::new(kind, id))
    }
}

/// Loosely-typed conversation reference
///
/// Callers that hold "a user, a group or a channel" fill in the slot that
/// matches. Converting into a [`ConversationIdentity`] fails unless exactly
/// one slot is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSelector {
    /// Direct conversation id
    pub direct: Option<ConversationId>,
    /// Group id
    pub group: Option<ConversationId>,
    /// Channel id
    pub channel: Option<ConversationId>,
}

impl TryFrom<ConversationSelector> for ConversationIdentity {
    type Error = SharedError;

    fn try_from(selector: ConversationSelector) -> Result<Self, Self::Error> {
        let set: Vec<ConversationIdentity> = [
            selector.direct.map(ConversationIdentity::direct),
            selector.group.map(ConversationIdentity::group),
            selector.channel.map(ConversationIdentity::channel),
        ]
        .into_iter()
        .flatten()
        .collect();

        match <[ConversationIdentity; 1]>::try_from(set) {
            Ok([identity]) => Ok(identity),
            Err(set) if set.is_empty() => {
                Err(SharedError::invalid_identity("no conversation kind set"))
            }
            Err(set) => Err(SharedError::invalid_identity(format!(
                "{} conversation kinds set, expected exactly one",
                set.len()
            ))),
        }
    }
}
