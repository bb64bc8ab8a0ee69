//! Backend Error Module
//!
//! This module defines the error type of the realtime backend.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - Error type definitions
//! └── conversion.rs - Conversions from transport errors
//! ```
//!
//! # Propagation Policy
//!
//! Only two failures reach a caller: `ChannelSubscriber::start()` failing
//! to connect, and usage errors (`NotStarted`, `InvalidIdentity`). Push
//! and poll workers absorb everything else and keep running until they
//! are closed.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

// Re-export commonly used types
pub use types::RealtimeError;
