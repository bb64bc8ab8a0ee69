//! Backend Module
//!
//! Everything that performs I/O: the record store, the push transports,
//! the subscriber/poller workers and the Postgres startup code.
//!
//! # Architecture
//!
//! - **`realtime`** - Channel routing, subscriber, publisher, poller,
//!   dispatcher and the session that ties them together
//! - **`messaging`** - Record store (Postgres and in-memory) and the
//!   dual-dispatch writer
//! - **`server`** - Database pool, migrations and backend assembly
//! - **`error`** - Backend error type
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs      - Module exports and documentation
//! ├── realtime/   - Push and poll paths
//! ├── messaging/  - Record storage and write path
//! ├── server/     - Startup
//! ├── error/      - Error types
//! └── main.rs     - xfpulse-watch binary
//! ```

/// Push and poll propagation
pub mod realtime;

/// Record storage and write path
pub mod messaging;

/// Startup and assembly
pub mod server;

/// Backend error types
pub mod error;

pub use error::RealtimeError;
