//! Server Module
//!
//! Startup of the Postgres-backed realtime stack: database pool,
//! migrations, notify trigger, and assembly of store, transport and
//! writer.
//!
//! # Module Structure
//!
//! ```text
//! server/
//! ├── mod.rs    - Module exports and documentation
//! ├── config.rs - Database connection and migrations
//! └── init.rs   - PgBackend assembly
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use xfpulse::backend::realtime::{ChannelContext, Dispatcher};
//! use xfpulse::backend::server::PgBackend;
//! use xfpulse::shared::{ConversationIdentity, RealtimeConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = PgBackend::connect(RealtimeConfig::load()?).await?;
//! let (context, _events) = ChannelContext::channel();
//! let session = backend.start_session(Dispatcher::new(context)).await?;
//! let (_view, _initial) = session.open_view(&ConversationIdentity::direct("c1")).await?;
//! # Ok(())
//! # }
//! ```

/// Database connection and migrations
pub mod config;

/// Backend assembly
pub mod init;

pub use config::{connect_database, StartupError};
pub use init::PgBackend;
