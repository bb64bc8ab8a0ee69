//! In-memory notification transport
//!
//! Single-process only; no persistence. Notifications are delivered to
//! the connections listening on a channel at publish time and are lost for
//! everybody else, matching the at-most-once contract of the real store.
//!
//! The transport also exposes fault injection (refused connects, dropped
//! connections) and a log of listen/unlisten calls, which the reconnect
//! tests rely on.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use super::transport::{
    Notification, NotifyTransport, PublishTransport, TransportConnection, TransportError,
};

/// A listen or unlisten call observed by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenEvent {
    /// Connection the call was made on
    pub connection: u64,
    /// Channel name
    pub channel: String,
    /// `true` for listen, `false` for unlisten
    pub listen: bool,
}

#[derive(Debug)]
struct ConnectionEntry {
    channels: HashSet<String>,
    tx: mpsc::UnboundedSender<Notification>,
}

#[derive(Debug, Default)]
struct Hub {
    next_id: u64,
    connections: HashMap<u64, ConnectionEntry>,
    refuse_connects: usize,
    listen_log: Vec<ListenEvent>,
    connects: u64,
}

/// In-process pub/sub hub
///
/// Cloning shares the hub, so one clone can serve the subscriber while
/// another publishes or injects faults.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryTransport {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        lock(&self.hub)
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse_connects(&self, count: usize) {
        self.hub().refuse_connects = count;
    }

    /// Kill every open connection, as if the server went away
    pub fn disconnect_all(&self) {
        let dropped = {
            let mut hub = self.hub();
            let count = hub.connections.len();
            hub.connections.clear();
            count
        };
        tracing::debug!("[MemoryTransport] Dropped {} connections", dropped);
    }

    /// Deliver a payload to current listeners of `channel`
    ///
    /// Returns how many connections received it.
    pub fn inject(&self, channel: &str, payload: &str) -> usize {
        let hub = self.hub();
        hub.connections
            .values()
            .filter(|c| c.channels.contains(channel))
            .filter(|c| c.tx.send(Notification::new(channel, payload)).is_ok())
            .count()
    }

    /// Listen/unlisten calls observed so far
    pub fn listen_log(&self) -> Vec<ListenEvent> {
        self.hub().listen_log.clone()
    }

    /// Forget the listen log
    pub fn clear_listen_log(&self) {
        self.hub().listen_log.clear();
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.hub().connections.len()
    }

    /// Number of successful connects since creation
    pub fn connect_count(&self) -> u64 {
        self.hub().connects
    }

    /// Number of connections listening on `channel`
    pub fn listener_count(&self, channel: &str) -> usize {
        self.hub()
            .connections
            .values()
            .filter(|c| c.channels.contains(channel))
            .count()
    }
}

fn lock(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl NotifyTransport for MemoryTransport {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, TransportError> {
        let mut hub = self.hub();
        if hub.refuse_connects > 0 {
            hub.refuse_connects -= 1;
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        hub.next_id += 1;
        hub.connects += 1;
        let id = hub.next_id;
        hub.connections.insert(
            id,
            ConnectionEntry {
                channels: HashSet::new(),
                tx,
            },
        );

        Ok(MemoryConnection {
            id,
            rx,
            hub: Arc::clone(&self.hub),
        })
    }
}

#[async_trait]
impl PublishTransport for MemoryTransport {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        self.inject(channel, payload);
        Ok(())
    }
}

/// A connection to a [`MemoryTransport`]
#[derive(Debug)]
pub struct MemoryConnection {
    id: u64,
    rx: mpsc::UnboundedReceiver<Notification>,
    hub: Arc<Mutex<Hub>>,
}

impl MemoryConnection {
    /// Connection id, as recorded in [`ListenEvent::connection`]
    pub fn id(&self) -> u64 {
        self.id
    }

    fn set_listening(&mut self, channel: &str, listen: bool) -> Result<(), TransportError> {
        let mut hub = lock(&self.hub);
        let entry = hub.connections.get_mut(&self.id).ok_or(TransportError::Closed)?;
        if listen {
            entry.channels.insert(channel.to_string());
        } else {
            entry.channels.remove(channel);
        }
        hub.listen_log.push(ListenEvent {
            connection: self.id,
            channel: channel.to_string(),
            listen,
        });
        Ok(())
    }
}

#[async_trait]
impl TransportConnection for MemoryConnection {
    async fn listen(&mut self, channel: &str) -> Result<(), TransportError> {
        self.set_listening(channel, true)
    }

    async fn unlisten(&mut self, channel: &str) -> Result<(), TransportError> {
        self.set_listening(channel, false)
    }

    async fn recv(&mut self) -> Result<Notification, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        if lock(&self.hub).connections.contains_key(&self.id) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    async fn close(&mut self) {
        lock(&self.hub).connections.remove(&self.id);
        self.rx.close();
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        lock(&self.hub).connections.remove(&self.id);
    }
}
