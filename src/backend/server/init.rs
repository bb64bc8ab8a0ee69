/**
 * Backend Initialization
 *
 * Assembles the Postgres-backed pieces from one pool:
 *
 * 1. **Store**: `PgRecordStore`, with the notify trigger installed or
 *    removed to match the configured publish mode
 * 2. **Transport**: `PgTransport` for listening connections
 * 3. **Writer**: `MessageWriter` over the store and a `PgPublisher`
 *
 * A `RealtimeSession` is started on top with [`PgBackend::start_session`].
 */

use std::sync::Arc;

use sqlx::PgPool;

use super::config::{connect_database, StartupError};
use crate::backend::error::RealtimeError;
use crate::backend::messaging::{MessageWriter, PgRecordStore};
use crate::backend::realtime::{Dispatcher, PgPublisher, PgTransport, Publisher, RealtimeSession};
use crate::shared::{PublishMode, RealtimeConfig};

/// Postgres-backed store, transport and writer
pub struct PgBackend {
    pub config: RealtimeConfig,
    pub pool: PgPool,
    pub store: Arc<PgRecordStore>,
    pub transport: Arc<PgTransport>,
    pub writer: MessageWriter,
}

impl PgBackend {
    /// Connect, migrate and prepare the store for the configured publish
    /// mode
    pub async fn connect(config: RealtimeConfig) -> Result<Self, StartupError> {
        let pool = connect_database(&config).await?;
        let store = Arc::new(PgRecordStore::new(pool.clone()));

        match config.publish_mode {
            PublishMode::Trigger => store.install_notify_trigger().await?,
            PublishMode::Application => store.remove_notify_trigger().await?,
        }

        let publisher = Publisher::new(Arc::new(PgPublisher::new(pool.clone())));
        let writer = MessageWriter::new(store.clone(), publisher, config.publish_mode);
        let transport = Arc::new(PgTransport::new(pool.clone()));
        tracing::info!("Backend ready, publish mode {:?}", config.publish_mode);

        Ok(Self {
            config,
            pool,
            store,
            transport,
            writer,
        })
    }

    /// Start a realtime session delivering to `dispatcher`
    pub async fn start_session(
        &self,
        dispatcher: Dispatcher,
    ) -> Result<RealtimeSession<PgTransport>, RealtimeError> {
        RealtimeSession::start(
            Arc::clone(&self.transport),
            self.store.clone(),
            dispatcher,
            &self.config,
        )
        .await
    }
}
