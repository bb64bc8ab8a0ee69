//! Channel Routing
//!
//! Maps a conversation identity to the name of the push channel that
//! carries its notifications. Writers publish on it, and every view of
//! the conversation listens on it.
//!
//! # Naming
//!
//! `{prefix}_{encoded id}` with prefix `private` (direct), `group` or
//! `channel`. ASCII letters and digits are kept; every other byte is
//! written as `_` followed by two lowercase hex digits. The encoding can
//! be reversed, so two different identities never share a channel.
//!
//! ```rust
//! use xfpulse::backend::realtime::ChannelRouter;
//! use xfpulse::shared::ConversationIdentity;
//!
//! let name = ChannelRouter::channel_for(&ConversationIdentity::direct("c1")).unwrap();
//! assert_eq!(name.as_str(), "private_c1");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared::{ConversationId, ConversationIdentity, ConversationKind, ConversationSelector, SharedError};

/// Longest channel name the transport accepts (Postgres identifier limit)
pub const MAX_CHANNEL_NAME_LEN: usize = 63;

/// Canonical push channel name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the name
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stateless conversation-to-channel router
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelRouter;

impl ChannelRouter {
    /// Channel name for a conversation
    ///
    /// Fails with `InvalidIdentity` for an empty id or when the encoded
    /// name would exceed [`MAX_CHANNEL_NAME_LEN`].
    pub fn channel_for(identity: &ConversationIdentity) -> Result<ChannelName, SharedError> {
        if identity.id.is_empty() {
            return Err(SharedError::invalid_identity("conversation id is empty"));
        }

        let prefix = Self::prefix(identity.kind);
        let mut name = String::with_capacity(prefix.len() + 1 + identity.id.as_str().len());
        name.push_str(prefix);
        name.push('_');
        for byte in identity.id.as_str().bytes() {
            if byte.is_ascii_alphanumeric() {
                name.push(byte as char);
            } else {
                name.push('_');
                name.push_str(&format!("{:02x}", byte));
            }
        }

        if name.len() > MAX_CHANNEL_NAME_LEN {
            return Err(SharedError::invalid_identity(format!(
                "channel name for {} is {} bytes, limit is {}",
                identity,
                name.len(),
                MAX_CHANNEL_NAME_LEN
            )));
        }
        Ok(ChannelName(name))
    }

    /// Channel name for a loosely-typed selector
    pub fn channel_for_selector(selector: ConversationSelector) -> Result<ChannelName, SharedError> {
        let identity = ConversationIdentity::try_from(selector)?;
        Self::channel_for(&identity)
    }

    /// Recover the conversation from a channel name produced by
    /// [`ChannelRouter::channel_for`]
    pub fn conversation_for(name: &str) -> Option<ConversationIdentity> {
        let (kind, encoded) = ConversationKind::ALL.iter().find_map(|kind| {
            name.strip_prefix(Self::prefix(*kind))
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| (*kind, rest))
        })?;

        let mut bytes = Vec::with_capacity(encoded.len());
        let mut iter = encoded.bytes();
        while let Some(byte) = iter.next() {
            if byte == b'_' {
                let hi = (iter.next()? as char).to_digit(16)?;
                let lo = (iter.next()? as char).to_digit(16)?;
                bytes.push((hi * 16 + lo) as u8);
            } else if byte.is_ascii_alphanumeric() {
                bytes.push(byte);
            } else {
                return None;
            }
        }
        let id = String::from_utf8(bytes).ok()?;
        if id.is_empty() {
            return None;
        }
        Some(ConversationIdentity::new(kind, ConversationId::new(id)))
    }

    fn prefix(kind: ConversationKind) -> &'static str {
        match kind {
            ConversationKind::Direct => "private",
            ConversationKind::Group => "group",
            ConversationKind::Channel => "channel",
        }
    }
}
