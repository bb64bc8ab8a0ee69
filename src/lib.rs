//! xfpulse - Realtime Update Propagation
//!
//! Delivers "a message was written" to every open view of a conversation
//! in a chat application, over two redundant paths:
//!
//! - a **push path** (Postgres LISTEN/NOTIFY, or an in-process hub) that is
//!   fast but best-effort, and
//! - a **poll path** that re-reads the durable store against a per-view
//!   watermark and catches everything the push path missed.
//!
//! # Module Structure
//!
//! - **`shared`** - I/O-free types: conversation identities, records,
//!   watermarks, the push payload, timelines, configuration
//! - **`backend`** - Stores, transports, workers and startup
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xfpulse::backend::messaging::{MemoryRecordStore, MessageWriter};
//! use xfpulse::backend::realtime::{ChannelContext, Dispatcher, MemoryTransport, Publisher, RealtimeSession};
//! use xfpulse::shared::{ConversationIdentity, PublishMode, RealtimeConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(MemoryTransport::new());
//! let store = Arc::new(MemoryRecordStore::new());
//! let writer = MessageWriter::new(store.clone(), Publisher::new(transport.clone()), PublishMode::Application);
//!
//! let (context, mut events) = ChannelContext::channel();
//! let session = RealtimeSession::start(transport, store, Dispatcher::new(context), &RealtimeConfig::default()).await?;
//! let conversation = ConversationIdentity::group("team");
//! let (_view, _initial) = session.open_view(&conversation).await?;
//!
//! writer.send(&conversation, "alice", "hello").await?;
//! let _event = events.recv().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! - `shared::SharedError` for identity, serialization and validation
//! - `backend::RealtimeError` for everything the workers can report
//! - Background workers log and recover; only startup and usage errors
//!   reach the caller

/// Shared types and data structures
pub mod shared;

/// Stores, transports and workers
pub mod backend;
