//! Realtime Session
//!
//! Wires the push and poll paths together for a set of open conversation
//! views:
//!
//! ```text
//! open_view(c) ──> subscribe(channel_for(c))     push path
//!              ──> latest(c, limit)              initial load
//!              ──> ReconciliationPoller(c, wm)   poll path
//! ```
//!
//! Several views of the same conversation share one channel subscription;
//! the channel is unsubscribed when the last of them closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex;

use super::dispatcher::Dispatcher;
use super::poller::{PollerHandle, ReconciliationPoller, ViewHandle};
use super::router::{ChannelName, ChannelRouter};
use super::subscriber::{ChannelSubscriber, SubscriberConfig, SubscriberState};
use super::transport::NotifyTransport;
use crate::backend::error::RealtimeError;
use crate::backend::messaging::RecordStore;
use crate::shared::{ChatRecord, ConversationIdentity, RealtimeConfig, Watermark};

struct OpenView {
    conversation: ConversationIdentity,
    channel: ChannelName,
    poller: PollerHandle,
}

#[derive(Default)]
struct Views {
    open: HashMap<ViewHandle, OpenView>,
    channel_refs: HashMap<ChannelName, usize>,
}

/// Owner of the subscriber and of every open view's poller
pub struct RealtimeSession<T: NotifyTransport> {
    store: Arc<dyn RecordStore>,
    subscriber: ChannelSubscriber<T>,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    initial_load_limit: i64,
    next_view: AtomicU64,
    views: Mutex<Views>,
}

impl<T: NotifyTransport> RealtimeSession<T> {
    /// Start the subscriber and return a session with no open views
    ///
    /// Fails with `ConnectError` if the transport is unreachable.
    pub async fn start(
        transport: Arc<T>,
        store: Arc<dyn RecordStore>,
        dispatcher: Dispatcher,
        config: &RealtimeConfig,
    ) -> Result<Self, RealtimeError> {
        let subscriber = ChannelSubscriber::new(
            transport,
            SubscriberConfig::from(config),
            dispatcher.push_callback(),
        );
        subscriber.start().await?;

        Ok(Self {
            store,
            subscriber,
            dispatcher,
            poll_interval: config.poll_interval,
            initial_load_limit: config.initial_load_limit,
            next_view: AtomicU64::new(1),
            views: Mutex::new(Views::default()),
        })
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn subscriber_state(&self) -> SubscriberState {
        self.subscriber.state()
    }

    pub fn subscriber(&self) -> &ChannelSubscriber<T> {
        &self.subscriber
    }

    /// Open a view of `conversation`
    ///
    /// Subscribes to the conversation's channel, loads the newest records
    /// and starts a poller from the watermark of that load. Returns the
    /// view handle and the initial records, oldest first.
    pub async fn open_view(
        &self,
        conversation: &ConversationIdentity,
    ) -> Result<(ViewHandle, Vec<ChatRecord>), RealtimeError> {
        let channel = ChannelRouter::channel_for(conversation)?;
        let mut views = self.views.lock().await;

        self.subscriber.subscribe(&channel)?;
        *views.channel_refs.entry(channel.clone()).or_insert(0) += 1;

        let initial = match self.store.latest(conversation, self.initial_load_limit).await {
            Ok(records) => records,
            Err(e) => {
                self.release_channel(&mut views, &channel);
                return Err(e);
            }
        };

        let view = ViewHandle::new(self.next_view.fetch_add(1, Ordering::Relaxed));
        let watermark = Watermark::from_records(&initial);
        let poller = ReconciliationPoller::new(
            view,
            conversation.clone(),
            Arc::clone(&self.store),
            watermark,
            self.dispatcher.poll_callback(),
        )
        .spawn(self.poll_interval);

        views.open.insert(
            view,
            OpenView {
                conversation: conversation.clone(),
                channel,
                poller,
            },
        );
        tracing::info!(
            "[Session] Opened {} for {} with {} record(s), watermark {}",
            view,
            conversation,
            initial.len(),
            watermark
        );
        Ok((view, initial))
    }

    /// Close a view: stop its poller and drop its channel reference
    ///
    /// Returns `false` if the view was not open.
    pub async fn close_view(&self, view: ViewHandle) -> bool {
        let mut views = self.views.lock().await;
        let Some(mut open) = views.open.remove(&view) else {
            return false;
        };

        open.poller.stop().await;
        self.release_channel(&mut views, &open.channel);
        tracing::info!("[Session] Closed {} for {}", view, open.conversation);
        true
    }

    /// Handles of the open views
    pub async fn open_views(&self) -> Vec<ViewHandle> {
        let mut handles: Vec<_> = self.views.lock().await.open.keys().copied().collect();
        handles.sort();
        handles
    }

    /// Poll watermark of an open view
    pub async fn watermark(&self, view: ViewHandle) -> Option<Watermark> {
        self.views
            .lock()
            .await
            .open
            .get(&view)
            .map(|open| open.poller.watermark())
    }

    /// Close every view and the subscriber
    pub async fn shutdown(&self) {
        let mut views = self.views.lock().await;
        let mut pollers: Vec<_> = views.open.drain().map(|(_, open)| open.poller).collect();
        join_all(pollers.iter_mut().map(|poller| poller.stop())).await;
        views.channel_refs.clear();
        drop(views);

        self.subscriber.close().await;
        tracing::info!("[Session] Shut down");
    }

    fn release_channel(&self, views: &mut Views, channel: &ChannelName) {
        let remaining = match views.channel_refs.get_mut(channel) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            views.channel_refs.remove(channel);
            self.subscriber.unsubscribe(channel);
        }
    }
}
