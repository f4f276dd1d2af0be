//! # hermod-store
//!
//! Document-store persistence for the Hermod broker.
//!
//! The broker intercepts process-lifecycle and log messages and records them
//! here. Two collections back a pooled `SQLite` database:
//!
//! - `process` — process instance documents
//! - `log` — log and event documents, with `writtenBy` author attribution
//!
//! Store failures are reported to callers but must never block routing or
//! shutdown; the broker logs and counts them.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod store;

pub use connection::{new_in_memory, new_with_path, ConnectionConfig, ConnectionPool};
pub use errors::StoreError;
pub use store::{Collection, DocumentStore};
