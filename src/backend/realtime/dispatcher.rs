//! Dispatcher
//!
//! The one place where push payloads and poll batches cross over to the
//! consumer's execution context. A push payload only names the changed
//! record; the dispatcher turns it into a "refresh this conversation"
//! event and the consumer reads the record through the store itself.
//!
//! Dispatch never blocks the caller. Two contexts are provided:
//!
//! - [`ChannelContext`] queues events to a single consumer task, the
//!   equivalent of marshalling onto a UI thread.
//! - [`InlineContext`] runs the consumer synchronously, for tests and
//!   consumers that are already thread-safe and cheap.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::poller::ViewHandle;
use crate::backend::error::RealtimeError;
use crate::shared::{ChatRecord, ConversationIdentity, NotificationPayload};

/// Event delivered to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    /// A record was written to `conversation`; re-read it
    Refresh {
        conversation: ConversationIdentity,
        record_id: Uuid,
    },
    /// Records found by the reconciliation poller of `view`
    PollBatch {
        view: ViewHandle,
        records: Vec<ChatRecord>,
    },
}

/// Execution context the consumer runs on
pub trait DispatchContext: Send + Sync + 'static {
    /// Hand an event to the consumer without waiting for it to be handled
    fn dispatch(&self, event: ConsumerEvent) -> Result<(), RealtimeError>;
}

/// Runs the consumer on the calling thread
pub struct InlineContext<F> {
    consumer: F,
}

impl<F> InlineContext<F>
where
    F: Fn(ConsumerEvent) + Send + Sync + 'static,
{
    pub fn new(consumer: F) -> Self {
        Self { consumer }
    }
}

impl<F> DispatchContext for InlineContext<F>
where
    F: Fn(ConsumerEvent) + Send + Sync + 'static,
{
    fn dispatch(&self, event: ConsumerEvent) -> Result<(), RealtimeError> {
        (self.consumer)(event);
        Ok(())
    }
}

/// Queues events to a single consumer task
#[derive(Debug, Clone)]
pub struct ChannelContext {
    tx: mpsc::UnboundedSender<ConsumerEvent>,
}

impl ChannelContext {
    /// Context plus the receiving end, for consumers that drive their own
    /// loop
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConsumerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Context whose events are handled one at a time by `consumer` on a
    /// spawned task
    ///
    /// The task ends when every clone of the context is dropped.
    pub fn spawn<F>(mut consumer: F) -> (Self, JoinHandle<()>)
    where
        F: FnMut(ConsumerEvent) + Send + 'static,
    {
        let (context, mut rx) = Self::channel();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                consumer(event);
            }
            tracing::debug!("[Dispatcher] Consumer task finished");
        });
        (context, task)
    }
}

impl DispatchContext for ChannelContext {
    fn dispatch(&self, event: ConsumerEvent) -> Result<(), RealtimeError> {
        self.tx
            .send(event)
            .map_err(|_| RealtimeError::callback("consumer context is closed"))
    }
}

/// Fan-in from the push and poll paths to the consumer context
#[derive(Clone)]
pub struct Dispatcher {
    context: Arc<dyn DispatchContext>,
}

impl Dispatcher {
    pub fn new(context: impl DispatchContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    /// Translate a push payload into a refresh signal
    pub fn on_push_event(&self, payload: NotificationPayload) -> Result<(), RealtimeError> {
        let conversation = payload.conversation();
        tracing::trace!("[Dispatcher] Refresh {} for {}", conversation, payload.record_id);
        self.context.dispatch(ConsumerEvent::Refresh {
            conversation,
            record_id: payload.record_id,
        })
    }

    /// Forward a poll batch
    pub fn on_poll_batch(&self, view: ViewHandle, records: Vec<ChatRecord>) -> Result<(), RealtimeError> {
        tracing::trace!("[Dispatcher] {} record(s) polled for {}", records.len(), view);
        self.context.dispatch(ConsumerEvent::PollBatch { view, records })
    }

    /// Callback for [`ChannelSubscriber::new`](super::ChannelSubscriber::new)
    pub fn push_callback(&self) -> impl Fn(NotificationPayload) -> Result<(), RealtimeError> + Send + Sync + 'static {
        let dispatcher = self.clone();
        move |payload| dispatcher.on_push_event(payload)
    }

    /// Callback for [`ReconciliationPoller::new`](super::ReconciliationPoller::new)
    pub fn poll_callback(
        &self,
    ) -> impl Fn(ViewHandle, Vec<ChatRecord>) -> Result<(), RealtimeError> + Send + Sync + 'static {
        let dispatcher = self.clone();
        move |view, records| dispatcher.on_poll_batch(view, records)
    }
}
