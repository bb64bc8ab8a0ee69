//! Channel Subscriber
//!
//! Keeps one listening connection to the notification transport and hands
//! every payload that arrives on it to a single callback.
//!
//! # State machine
//!
//! ```text
//! Stopped -> Connecting -> Listening -> (failure) Reconnecting -> Listening
//!                                                      |
//!                                   close() from any state -> Stopped
//! ```
//!
//! The subscription set is the source of truth and the connection is
//! disposable: after every reconnect the loop listens on every channel in
//! the set before it receives anything else. Listen/unlisten requests from
//! callers are queued to the receive loop, which is the only owner of the
//! connection.
//!
//! # Failure handling
//!
//! - Connection failures after `start()` are retried forever with backoff.
//! - Every round-trip on the connection (listen, unlisten, liveness probe)
//!   is bounded by `receive_timeout`; a peer that stops answering is
//!   treated as a lost connection.
//! - Malformed payloads are logged and dropped.
//! - Callback errors and panics are logged; the loop keeps running.
//! - Once `close()` returns, the callback is never invoked again.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::router::ChannelRouter;
use super::transport::{Notification, NotifyTransport, TransportConnection, TransportError};
use crate::backend::error::RealtimeError;
use crate::shared::{NotificationPayload, RealtimeConfig};

/// Callback invoked for every decoded push payload
pub type PushCallback = Arc<dyn Fn(NotificationPayload) -> Result<(), RealtimeError> + Send + Sync>;

/// Lifecycle state of a [`ChannelSubscriber`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Not running; initial and final state
    Stopped,
    /// `start()` is establishing the first connection
    Connecting,
    /// Connected and receiving
    Listening,
    /// Connection lost; backing off and reconnecting
    Reconnecting,
}

/// Timing knobs of the subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberConfig {
    /// First delay before a reconnection attempt
    pub reconnect_delay: Duration,
    /// Cap for the doubling reconnect delay
    pub max_reconnect_delay: Duration,
    /// Bound on a single wait for a payload and on every connection
    /// round-trip
    pub receive_timeout: Duration,
    /// Spacing of liveness probes
    pub liveness_interval: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self::from(&RealtimeConfig::default())
    }
}

impl From<&RealtimeConfig> for SubscriberConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay,
            max_reconnect_delay: config.max_reconnect_delay,
            receive_timeout: config.receive_timeout,
            liveness_interval: config.liveness_interval,
        }
    }
}

/// Doubling delay with an upper bound
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Start at `base`, never exceed `max`
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    /// Delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Start over from the base delay
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[derive(Debug)]
enum Command {
    Listen(String),
    Unlisten(String),
}

struct Shared {
    channels: Mutex<BTreeSet<String>>,
    state: watch::Sender<SubscriberState>,
    closed: AtomicBool,
}

impl Shared {
    fn channels(&self) -> MutexGuard<'_, BTreeSet<String>> {
        lock(&self.channels)
    }

    fn is_subscribed(&self, channel: &str) -> bool {
        self.channels().contains(channel)
    }

    fn snapshot(&self) -> Vec<String> {
        self.channels().iter().cloned().collect()
    }

    fn set_state(&self, state: SubscriberState) {
        self.state.send_replace(state);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Persistent channel subscription client
pub struct ChannelSubscriber<T: NotifyTransport> {
    transport: Arc<T>,
    config: SubscriberConfig,
    callback: PushCallback,
    shared: Arc<Shared>,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl<T: NotifyTransport> ChannelSubscriber<T> {
    /// Create a stopped subscriber that will forward payloads to `callback`
    pub fn new<F>(transport: Arc<T>, config: SubscriberConfig, callback: F) -> Self
    where
        F: Fn(NotificationPayload) -> Result<(), RealtimeError> + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(SubscriberState::Stopped);
        Self {
            transport,
            config,
            callback: Arc::new(callback),
            shared: Arc::new(Shared {
                channels: Mutex::new(BTreeSet::new()),
                state,
                closed: AtomicBool::new(true),
            }),
            commands: Mutex::new(None),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Current state
    pub fn state(&self) -> SubscriberState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn watch_state(&self) -> watch::Receiver<SubscriberState> {
        self.shared.state.subscribe()
    }

    /// Channels currently in the subscription set
    pub fn channels(&self) -> Vec<String> {
        self.shared.snapshot()
    }

    /// Connect and spawn the receive loop
    ///
    /// Fails with `ConnectError` if the first connection cannot be opened;
    /// the caller decides whether to retry. Calling `start()` on a running
    /// subscriber does nothing.
    pub async fn start(&self) -> Result<(), RealtimeError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::debug!("[Subscriber] start() called while running, ignoring");
            return Ok(());
        }

        self.shared.set_state(SubscriberState::Connecting);
        let mut connection = match self.transport.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                self.shared.set_state(SubscriberState::Stopped);
                tracing::warn!("[Subscriber] Initial connection failed: {}", e);
                return Err(RealtimeError::connect(e.to_string()));
            }
        };

        let channels = self.shared.snapshot();
        if let Err(e) = replay(&mut connection, &channels, self.config.receive_timeout).await {
            release(&mut connection, self.config.receive_timeout).await;
            self.shared.set_state(SubscriberState::Stopped);
            return Err(RealtimeError::connect(e.to_string()));
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *lock(&self.commands) = Some(command_tx);
        self.shared.closed.store(false, Ordering::SeqCst);
        self.shared.set_state(SubscriberState::Listening);

        let receive_loop = ReceiveLoop {
            transport: Arc::clone(&self.transport),
            shared: Arc::clone(&self.shared),
            callback: Arc::clone(&self.callback),
            config: self.config.clone(),
            backoff: Backoff::new(self.config.reconnect_delay, self.config.max_reconnect_delay),
            commands: command_rx,
            shutdown: shutdown_rx,
        };
        let active: HashSet<String> = channels.into_iter().collect();
        let task = tokio::spawn(receive_loop.run(connection, active));

        *running = Some(Running {
            shutdown: shutdown_tx,
            task,
        });
        tracing::info!("[Subscriber] Listening");
        Ok(())
    }

    /// Add a channel to the subscription set
    ///
    /// Idempotent. The channel is listened on as soon as a connection
    /// exists, including after any later reconnect.
    pub fn subscribe(&self, channel: impl AsRef<str>) -> Result<(), RealtimeError> {
        let channel = channel.as_ref();
        let commands = lock(&self.commands);
        let sender = commands.as_ref().ok_or(RealtimeError::NotStarted)?;

        if self.shared.channels().insert(channel.to_string()) {
            tracing::debug!("[Subscriber] Subscribing to {}", channel);
            let _ = sender.send(Command::Listen(channel.to_string()));
        }
        Ok(())
    }

    /// Remove a channel from the subscription set
    ///
    /// Idempotent. The transport-level unlisten is best-effort.
    pub fn unsubscribe(&self, channel: impl AsRef<str>) {
        let channel = channel.as_ref();
        let commands = lock(&self.commands);

        if self.shared.channels().remove(channel) {
            tracing::debug!("[Subscriber] Unsubscribing from {}", channel);
            if let Some(sender) = commands.as_ref() {
                let _ = sender.send(Command::Unlisten(channel.to_string()));
            }
        }
    }

    /// Stop the receive loop and release the connection
    ///
    /// Idempotent. When this returns, the callback will not be invoked
    /// again.
    pub async fn close(&self) {
        let mut running = self.running.lock().await;
        self.shared.closed.store(true, Ordering::SeqCst);
        lock(&self.commands).take();

        if let Some(Running { shutdown, task }) = running.take() {
            let _ = shutdown.send(true);
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("[Subscriber] Receive loop panicked: {}", e);
                }
            }
            tracing::info!("[Subscriber] Closed");
        }

        self.shared.channels().clear();
        self.shared.set_state(SubscriberState::Stopped);
    }
}

impl<T: NotifyTransport> Drop for ChannelSubscriber<T> {
    fn drop(&mut self) {
        // The loop exits once the shutdown sender inside `running` is dropped.
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

async fn replay<C: TransportConnection>(
    connection: &mut C,
    channels: &[String],
    limit: Duration,
) -> Result<(), TransportError> {
    for channel in channels {
        bounded(limit, "listen", connection.listen(channel)).await?;
        tracing::debug!("[Subscriber] Listening on {}", channel);
    }
    Ok(())
}

/// Fail a connection round-trip that takes longer than `limit`
async fn bounded<R>(
    limit: Duration,
    what: &str,
    op: impl Future<Output = Result<R, TransportError>>,
) -> Result<R, TransportError> {
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Io(format!(
            "{} timed out after {}ms",
            what,
            limit.as_millis()
        ))),
    }
}

/// Give up on a round-trip as soon as shutdown is requested
async fn interruptible<R>(
    shutdown: &mut watch::Receiver<bool>,
    op: impl Future<Output = Result<R, TransportError>>,
) -> Result<R, SessionEnd> {
    tokio::select! {
        biased;
        _ = shutdown.changed() => Err(SessionEnd::Shutdown),
        result = op => result.map_err(SessionEnd::Failed),
    }
}

/// Longest wait for a connection to close before it is dropped
const CLOSE_TIMEOUT: Duration = Duration::from_millis(250);

/// Close a connection that may no longer answer
async fn release<C: TransportConnection>(connection: &mut C, limit: Duration) {
    if tokio::time::timeout(limit.min(CLOSE_TIMEOUT), connection.close()).await.is_err() {
        tracing::debug!("[Subscriber] Close timed out, dropping connection");
    }
}

enum Step {
    Shutdown,
    Command(Command),
    Received(Notification),
    Failed(TransportError),
    Idle,
}

enum SessionEnd {
    Shutdown,
    Failed(TransportError),
}

struct ReceiveLoop<T: NotifyTransport> {
    transport: Arc<T>,
    shared: Arc<Shared>,
    callback: PushCallback,
    config: SubscriberConfig,
    backoff: Backoff,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: watch::Receiver<bool>,
}

impl<T: NotifyTransport> ReceiveLoop<T> {
    async fn run(mut self, mut connection: T::Connection, mut active: HashSet<String>) {
        loop {
            let end = self.session(&mut connection, &mut active).await;
            release(&mut connection, self.config.receive_timeout).await;

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Failed(e) => {
                    tracing::warn!(
                        "[Subscriber] {}",
                        RealtimeError::transient(format!("connection lost: {}", e))
                    );
                    match self.reconnect().await {
                        Some((fresh, listened)) => {
                            connection = fresh;
                            active = listened;
                        }
                        None => break,
                    }
                }
            }
        }
        tracing::debug!("[Subscriber] Receive loop exited");
    }

    /// Receive on one connection until it fails or shutdown is requested
    async fn session(
        &mut self,
        connection: &mut T::Connection,
        active: &mut HashSet<String>,
    ) -> SessionEnd {
        let mut last_probe = Instant::now();
        loop {
            let step = tokio::select! {
                biased;
                _ = self.shutdown.changed() => Step::Shutdown,
                Some(command) = self.commands.recv() => Step::Command(command),
                result = tokio::time::timeout(self.config.receive_timeout, connection.recv()) => {
                    match result {
                        Ok(Ok(notification)) => Step::Received(notification),
                        Ok(Err(e)) => Step::Failed(e),
                        Err(_) => Step::Idle,
                    }
                }
            };

            match step {
                Step::Shutdown => return SessionEnd::Shutdown,
                Step::Failed(e) => return SessionEnd::Failed(e),
                Step::Command(command) => {
                    if let Err(end) = self.apply(connection, active, command).await {
                        return end;
                    }
                }
                Step::Received(notification) => self.deliver(notification),
                Step::Idle => {}
            }

            if last_probe.elapsed() >= self.config.liveness_interval {
                last_probe = Instant::now();
                let limit = self.config.receive_timeout;
                let probe = bounded(limit, "liveness probe", connection.ping());
                if let Err(end) = interruptible(&mut self.shutdown, probe).await {
                    return end;
                }
                tracing::trace!("[Subscriber] Liveness probe ok");
            }
        }
    }

    async fn apply(
        &mut self,
        connection: &mut T::Connection,
        active: &mut HashSet<String>,
        command: Command,
    ) -> Result<(), SessionEnd> {
        let limit = self.config.receive_timeout;
        match command {
            Command::Listen(channel) => {
                if active.contains(&channel) || !self.shared.is_subscribed(&channel) {
                    return Ok(());
                }
                let listen = bounded(limit, "listen", connection.listen(&channel));
                interruptible(&mut self.shutdown, listen).await?;
                tracing::info!("[Subscriber] Subscribed to channel: {}", channel);
                active.insert(channel);
            }
            Command::Unlisten(channel) => {
                if self.shared.is_subscribed(&channel) || !active.remove(&channel) {
                    return Ok(());
                }
                let unlisten = bounded(limit, "unlisten", connection.unlisten(&channel));
                match interruptible(&mut self.shutdown, unlisten).await {
                    Ok(()) => tracing::info!("[Subscriber] Unsubscribed from channel: {}", channel),
                    Err(SessionEnd::Failed(e)) => {
                        tracing::warn!("[Subscriber] Unlisten {} failed, ignoring: {}", channel, e)
                    }
                    Err(SessionEnd::Shutdown) => return Err(SessionEnd::Shutdown),
                }
            }
        }
        Ok(())
    }

    fn deliver(&self, notification: Notification) {
        if self.shared.closed.load(Ordering::SeqCst) {
            return;
        }
        if !self.shared.is_subscribed(&notification.channel) {
            tracing::debug!(
                "[Subscriber] Ignoring payload on unsubscribed channel {}",
                notification.channel
            );
            return;
        }

        let payload = match NotificationPayload::decode(&notification.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    "[Subscriber] Dropping malformed payload on {}: {}",
                    notification.channel,
                    e
                );
                return;
            }
        };
        match ChannelRouter::channel_for(&payload.conversation()) {
            Ok(expected) if expected.as_str() == notification.channel => {}
            _ => {
                tracing::warn!(
                    "[Subscriber] Dropping payload for {} received on {}",
                    payload.conversation(),
                    notification.channel
                );
                return;
            }
        }

        tracing::trace!("[Subscriber] Payload on {}: {}", notification.channel, payload.record_id);
        let callback = Arc::clone(&self.callback);
        match catch_unwind(AssertUnwindSafe(move || callback(payload))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("[Subscriber] {}", RealtimeError::callback(e.to_string()));
            }
            Err(_) => {
                tracing::error!("[Subscriber] {}", RealtimeError::callback("callback panicked"));
            }
        }
    }

    /// Back off, reconnect and replay the subscription set
    ///
    /// Returns `None` only when shutdown is requested.
    async fn reconnect(&mut self) -> Option<(T::Connection, HashSet<String>)> {
        self.shared.set_state(SubscriberState::Reconnecting);
        let limit = self.config.receive_timeout;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let delay = self.backoff.next_delay();
            tracing::info!(
                "[Subscriber] Reconnect attempt {} in {}ms",
                attempt,
                delay.as_millis()
            );

            tokio::select! {
                biased;
                _ = self.shutdown.changed() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            let connected = tokio::select! {
                biased;
                _ = self.shutdown.changed() => return None,
                result = self.transport.connect() => result,
            };
            let mut connection = match connected {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::warn!("[Subscriber] Reconnect attempt {} failed: {}", attempt, e);
                    continue;
                }
            };

            // Queued requests are superseded by the replay of the full set.
            while self.commands.try_recv().is_ok() {}
            let channels = self.shared.snapshot();

            let replayed = interruptible(&mut self.shutdown, replay(&mut connection, &channels, limit)).await;
            match replayed {
                Ok(()) => {
                    self.backoff.reset();
                    tracing::info!(
                        "[Subscriber] Reconnected after {} attempt(s), resubscribed {} channel(s)",
                        attempt,
                        channels.len()
                    );
                    self.shared.set_state(SubscriberState::Listening);
                    return Some((connection, channels.into_iter().collect()));
                }
                Err(SessionEnd::Failed(e)) => {
                    tracing::warn!("[Subscriber] Resubscribe failed, retrying: {}", e);
                    release(&mut connection, limit).await;
                }
                Err(SessionEnd::Shutdown) => {
                    release(&mut connection, limit).await;
                    return None;
                }
            }
        }
    }
}
