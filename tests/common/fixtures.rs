//! In-memory test harness
//!
//! Wires a `MemoryTransport`, a `MemoryRecordStore` and a `MessageWriter`
//! together with timings short enough for tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;
use xfpulse::backend::messaging::{MemoryRecordStore, MessageWriter};
use xfpulse::backend::realtime::{
    ChannelContext, ConsumerEvent, Dispatcher, MemoryTransport, Publisher, RealtimeSession,
};
use xfpulse::shared::{ChatRecord, ConversationIdentity, PublishMode, RealtimeConfig};

/// Realtime config with millisecond timings
pub fn fast_config() -> RealtimeConfig {
    RealtimeConfig::builder()
        .poll_interval(Duration::from_millis(25))
        .reconnect_delay(Duration::from_millis(10))
        .max_reconnect_delay(Duration::from_millis(40))
        .receive_timeout(Duration::from_millis(10))
        .liveness_interval(Duration::from_millis(100))
        .build()
        .expect("valid test config")
}

/// Memory transport + store + writer
pub struct Harness {
    pub transport: MemoryTransport,
    pub store: Arc<MemoryRecordStore>,
    pub writer: MessageWriter,
    pub config: RealtimeConfig,
}

impl Harness {
    /// Application-publish harness
    pub fn new() -> Self {
        Self::with_mode(PublishMode::Application)
    }

    /// Harness for a publish mode; trigger mode wires the store to the
    /// transport
    pub fn with_mode(mode: PublishMode) -> Self {
        let transport = MemoryTransport::new();
        let store = Arc::new(match mode {
            PublishMode::Application => MemoryRecordStore::new(),
            PublishMode::Trigger => MemoryRecordStore::with_trigger(transport.clone()),
        });
        let writer = MessageWriter::new(
            store.clone(),
            Publisher::new(Arc::new(transport.clone())),
            mode,
        );
        Self {
            transport,
            store,
            writer,
            config: fast_config(),
        }
    }

    /// Start a session whose events are queued to the returned receiver
    pub async fn session(
        &self,
    ) -> (
        RealtimeSession<MemoryTransport>,
        mpsc::UnboundedReceiver<ConsumerEvent>,
    ) {
        let (context, events) = ChannelContext::channel();
        let session = RealtimeSession::start(
            Arc::new(self.transport.clone()),
            self.store.clone(),
            Dispatcher::new(context),
            &self.config,
        )
        .await
        .expect("session start");
        (session, events)
    }

    /// Write through the dual-dispatch path
    pub async fn send(&self, conversation: &ConversationIdentity, body: &str) -> ChatRecord {
        self.writer
            .send(conversation, "tester", body)
            .await
            .expect("write succeeds")
    }
}

/// Timestamp `secs` seconds after the epoch
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Record with a fixed timestamp
pub fn record_at(conversation: &ConversationIdentity, secs: i64) -> ChatRecord {
    ChatRecord {
        id: Uuid::new_v4(),
        conversation: conversation.clone(),
        sender: "tester".into(),
        body: format!("at {}", secs),
        created_at: ts(secs),
    }
}
