/**
 * Database Configuration
 *
 * Opens the PostgreSQL pool used by the record store, the publisher and
 * the listening connections, and brings the schema up to date.
 *
 * # Configuration Sources
 *
 * The connection string comes from `RealtimeConfig::database_url`, which
 * is filled from `DATABASE_URL` or the config file.
 *
 * # Error Handling
 *
 * Unlike the background workers, startup fails loudly: a missing URL, an
 * unreachable server or a failed migration is returned to the caller.
 */

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use crate::shared::{ConfigError, RealtimeConfig};

/// Pool size; one connection per listener plus a few for reads and writes
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// Startup failures
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database connection failed: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Connect to the configured database and run pending migrations
///
/// # Example
///
/// ```rust,no_run
/// use xfpulse::backend::server::config::connect_database;
/// use xfpulse::shared::RealtimeConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RealtimeConfig::load()?;
/// let pool = connect_database(&config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect_database(config: &RealtimeConfig) -> Result<PgPool, StartupError> {
    let database_url = config.require_database_url()?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create database connection pool: {:?}", e);
            e
        })?;
    tracing::info!("Database connection pool created successfully");

    tracing::info!("Running database migrations...");
    sqlx::migrate!().run(&pool).await?;
    tracing::info!("Database migrations completed successfully");

    Ok(pool)
}
