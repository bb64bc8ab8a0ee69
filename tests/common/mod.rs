//! Common test utilities and helpers
//!
//! - In-memory harness (transport, store, writer, session)
//! - Database fixtures for the ignored Postgres tests
//! - Assertion macros and async wait helpers

#![allow(dead_code)]

pub mod fixtures;

pub use assertions::*;
pub use database::*;
pub use fixtures::*;
