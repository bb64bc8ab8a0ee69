//! Reconciliation Poller
//!
//! One poller per open conversation view. Every interval it re-reads the
//! store for records newer than the view's watermark, hands any batch to
//! the consumer and moves the watermark forward. It runs whether or not
//! the push path is healthy, which is what makes the push path optional.
//!
//! Ticks never overlap: the next interval starts after the previous tick
//! finished. A failed store query is logged and retried on the next tick
//! with the watermark unchanged.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::error::RealtimeError;
use crate::backend::messaging::RecordStore;
use crate::shared::{ChatRecord, ConversationIdentity, Watermark};

/// Callback receiving each non-empty poll batch
pub type PollCallback = Arc<dyn Fn(ViewHandle, Vec<ChatRecord>) -> Result<(), RealtimeError> + Send + Sync>;

/// Identifies one open conversation view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewHandle(u64);

impl ViewHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view-{}", self.0)
    }
}

/// Watermark-driven re-reader for a single view
pub struct ReconciliationPoller {
    view: ViewHandle,
    conversation: ConversationIdentity,
    store: Arc<dyn RecordStore>,
    watermark: Watermark,
    callback: PollCallback,
    live: Arc<AtomicBool>,
}

impl ReconciliationPoller {
    /// Create a poller starting from `watermark`
    ///
    /// Use the watermark of the initial load, or [`Watermark::BEGINNING`]
    /// for an empty conversation.
    pub fn new<F>(
        view: ViewHandle,
        conversation: ConversationIdentity,
        store: Arc<dyn RecordStore>,
        watermark: Watermark,
        callback: F,
    ) -> Self
    where
        F: Fn(ViewHandle, Vec<ChatRecord>) -> Result<(), RealtimeError> + Send + Sync + 'static,
    {
        Self {
            view,
            conversation,
            store,
            watermark,
            callback: Arc::new(callback),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn view(&self) -> ViewHandle {
        self.view
    }

    pub fn conversation(&self) -> &ConversationIdentity {
        &self.conversation
    }

    /// Newest timestamp already handed to the consumer
    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Run one reconciliation pass
    ///
    /// Returns the batch that was delivered (possibly empty). On error the
    /// watermark is left untouched.
    pub async fn tick(&mut self) -> Result<Vec<ChatRecord>, RealtimeError> {
        let batch = self
            .store
            .records_after(&self.conversation, self.watermark)
            .await?;

        let Some(newest) = batch.last().map(|r| r.created_at) else {
            return Ok(batch);
        };

        if self.live.load(Ordering::SeqCst) {
            let callback = Arc::clone(&self.callback);
            let view = self.view;
            let records = batch.clone();
            match catch_unwind(AssertUnwindSafe(move || callback(view, records))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("[Poller] {} consumer failed: {}", self.view, e),
                Err(_) => tracing::error!("[Poller] {} consumer panicked", self.view),
            }
        }
        self.watermark.advance_to(newest);
        tracing::debug!(
            "[Poller] {} delivered {} record(s), watermark {}",
            self.view,
            batch.len(),
            self.watermark
        );
        Ok(batch)
    }

    /// Tick every `interval` on a background task until stopped
    pub fn spawn(self, interval: Duration) -> PollerHandle {
        let view = self.view;
        let live = Arc::clone(&self.live);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (watermark_tx, watermark_rx) = watch::channel(self.watermark);

        let task = tokio::spawn(self.run(interval, shutdown_rx, watermark_tx));
        tracing::info!("[Poller] Started {} every {}ms", view, interval.as_millis());

        PollerHandle {
            view,
            live,
            shutdown: shutdown_tx,
            watermark: watermark_rx,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        watermark: watch::Sender<Watermark>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The initial load already covers "now"; first pass after one interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                result = self.tick() => result,
            };

            match result {
                Ok(_) => {
                    watermark.send_replace(self.watermark);
                }
                Err(e) => {
                    tracing::warn!(
                        "[Poller] {} tick failed, retrying next interval: {}",
                        self.view,
                        e
                    );
                }
            }
        }
        tracing::debug!("[Poller] {} stopped", self.view);
    }
}

/// Control handle of a spawned poller
pub struct PollerHandle {
    view: ViewHandle,
    live: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    watermark: watch::Receiver<Watermark>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn view(&self) -> ViewHandle {
        self.view
    }

    /// Watermark after the last completed tick
    pub fn watermark(&self) -> Watermark {
        *self.watermark.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel pending and in-flight ticks and wait for the task to end
    ///
    /// Idempotent. No batch is delivered after this returns.
    pub async fn stop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("[Poller] {} task panicked: {}", self.view, e);
                }
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
