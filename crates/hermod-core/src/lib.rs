//! # hermod-core
//!
//! Shared vocabulary for the Hermod message broker:
//!
//! - **Messages**: [`PeerMessage`], the addressed JSON envelope peers exchange
//! - **Categories**: [`MessageCategory`], the tagged union a message's schema
//!   resolves to and the key of the broker's dispatch table
//! - **Close codes**: [`CloseCode`], the RFC 6455 codes plus the private
//!   restart/shutdown codes clients use to pick a reconnect strategy
//! - **Schema registry**: [`SchemaRegistry`], the validation collaborator
//!   mapping schema refs to categories
//! - **Factories**: canonical constructors for error replies, process
//!   documents, and process-state log messages
//! - **Identity**: [`Principal`], [`PeerType`], and branded ID newtypes

#![deny(unsafe_code)]

pub mod category;
pub mod close_code;
pub mod factory;
pub mod ids;
pub mod message;
pub mod principal;
pub mod schema;

pub use category::MessageCategory;
pub use close_code::CloseCode;
pub use ids::{ConnectionId, ProcessId, SessionId};
pub use message::PeerMessage;
pub use principal::{PeerType, Principal};
pub use schema::{SchemaError, SchemaRegistry};
