//! Postgres LISTEN/NOTIFY transport
//!
//! Listening connections are dedicated `PgListener`s opened from the pool;
//! publishing goes through ordinary pool connections with `pg_notify`.
//!
//! `PgListener` can reconnect on its own, but it does so silently and
//! without telling us which notifications were lost in between. A lost
//! connection is reported as [`TransportError::Closed`] instead, so the
//! subscriber runs its own backoff and resubscription.

use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPool};

use super::transport::{
    Notification, NotifyTransport, PublishTransport, TransportConnection, TransportError,
};

/// Listening side of Postgres LISTEN/NOTIFY
#[derive(Debug, Clone)]
pub struct PgTransport {
    pool: PgPool,
}

impl PgTransport {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotifyTransport for PgTransport {
    type Connection = PgListenerConnection;

    async fn connect(&self) -> Result<PgListenerConnection, TransportError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        listener.ignore_pool_close_event(true);
        tracing::debug!("[PgTransport] Opened listener connection");
        Ok(PgListenerConnection { listener })
    }
}

/// A dedicated LISTEN connection
pub struct PgListenerConnection {
    listener: PgListener,
}

#[async_trait]
impl TransportConnection for PgListenerConnection {
    async fn listen(&mut self, channel: &str) -> Result<(), TransportError> {
        self.listener.listen(channel).await?;
        Ok(())
    }

    async fn unlisten(&mut self, channel: &str) -> Result<(), TransportError> {
        self.listener.unlisten(channel).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Notification, TransportError> {
        match self.listener.try_recv().await? {
            Some(notification) => Ok(Notification::new(
                notification.channel(),
                notification.payload(),
            )),
            None => Err(TransportError::Closed),
        }
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        sqlx::query("SELECT 1").execute(&mut self.listener).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.listener.unlisten_all().await {
            tracing::debug!("[PgTransport] unlisten_all on close failed: {}", e);
        }
    }
}

/// Publishing side of Postgres LISTEN/NOTIFY
#[derive(Debug, Clone)]
pub struct PgPublisher {
    pool: PgPool,
}

impl PgPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PublishTransport for PgPublisher {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
