//! Messaging Module
//!
//! Durable chat records: the store interface, its PostgreSQL and
//! in-memory implementations, and the write path that announces new
//! records on the push channel.
//!
//! # Module Structure
//!
//! ```text
//! messaging/
//! ├── mod.rs    - Module exports
//! ├── store.rs  - RecordStore trait
//! ├── db.rs     - PostgreSQL store
//! ├── memory.rs - In-memory store
//! └── writer.rs - MessageWriter (dual dispatch)
//! ```

pub mod store;
pub mod db;
pub mod memory;
pub mod writer;

pub use store::RecordStore;
pub use db::PgRecordStore;
pub use memory::MemoryRecordStore;
pub use writer::MessageWriter;
