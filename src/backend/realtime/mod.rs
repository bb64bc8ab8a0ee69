//! Real-time Update Module
//!
//! Propagates "a record was written" from writers to every open view of
//! the conversation, over two redundant paths:
//!
//! - **Push**: the [`Publisher`] notifies the conversation's channel after a
//!   write; the [`ChannelSubscriber`] receives it and the [`Dispatcher`]
//!   turns it into a refresh signal. Fast, best-effort, at-most-once.
//! - **Poll**: a [`ReconciliationPoller`] per view re-reads the store
//!   every interval for records newer than its watermark. Slow, reliable.
//!
//! The consumer merges both by record id, so a record seen twice is shown
//! once and a record missed by the push path still shows up.
//!
//! # Module Structure
//!
//! ```text
//! realtime/
//! ├── mod.rs         - Module exports and documentation
//! ├── router.rs      - Conversation -> channel name
//! ├── transport.rs   - Transport traits
//! ├── memory.rs      - In-process transport
//! ├── postgres.rs    - LISTEN/NOTIFY transport
//! ├── subscriber.rs  - ChannelSubscriber and its reconnect loop
//! ├── publisher.rs   - Best-effort publish
//! ├── poller.rs      - ReconciliationPoller
//! ├── dispatcher.rs  - Hand-off to the consumer context
//! ├── consumer.rs    - Per-view timelines
//! └── session.rs     - RealtimeSession (views, pollers, subscriptions)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xfpulse::backend::messaging::MemoryRecordStore;
//! use xfpulse::backend::realtime::{ChannelContext, Dispatcher, MemoryTransport, RealtimeSession};
//! use xfpulse::shared::{ConversationIdentity, RealtimeConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (context, mut events) = ChannelContext::channel();
//! let session = RealtimeSession::start(
//!     Arc::new(MemoryTransport::new()),
//!     Arc::new(MemoryRecordStore::new()),
//!     Dispatcher::new(context),
//!     &RealtimeConfig::default(),
//! )
//! .await?;
//!
//! let (view, initial) = session.open_view(&ConversationIdentity::direct("c1")).await?;
//! while let Some(event) = events.recv().await {
//!     // merge into the view's timeline
//! }
//! session.close_view(view).await;
//! # Ok(())
//! # }
//! ```

pub mod router;
pub mod transport;
pub mod memory;
pub mod postgres;
pub mod subscriber;
pub mod publisher;
pub mod poller;
pub mod dispatcher;
pub mod consumer;
pub mod session;

pub use router::{ChannelName, ChannelRouter, MAX_CHANNEL_NAME_LEN};
pub use transport::{Notification, NotifyTransport, PublishTransport, TransportConnection, TransportError};
pub use memory::{MemoryConnection, MemoryTransport};
pub use postgres::{PgListenerConnection, PgPublisher, PgTransport};
pub use subscriber::{Backoff, ChannelSubscriber, PushCallback, SubscriberConfig, SubscriberState};
pub use publisher::Publisher;
pub use poller::{PollCallback, PollerHandle, ReconciliationPoller, ViewHandle};
pub use dispatcher::{ChannelContext, ConsumerEvent, DispatchContext, Dispatcher, InlineContext};
pub use consumer::ConsumerState;
pub use session::RealtimeSession;
