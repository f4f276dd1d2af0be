//! # hermod-broker
//!
//! The concurrent message-routing core of the Hermod broker:
//!
//! - [`Monitor`] — the dispatch engine: a single consumer task serializing
//!   all inbound traffic from one shared queue onto a [`QueueHandler`]
//! - [`BrokerHandler`] — the concrete handler: category dispatch, routing,
//!   and interception of process/log messages for persistence
//! - [`PeerRegistry`] — the session/address registry and its locking
//!   discipline under concurrent connect, disconnect, and re-register races
//! - [`DeliveryPump`] — one independently cancellable pump per live
//!   connection, draining that peer's private outbound queue
//! - [`ShutdownCoordinator`] — the two-phase stop/restart protocol with its
//!   distinct close-code semantics

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod handler;
pub mod monitor;
pub mod pump;
pub mod queue;
pub mod registry;
pub mod session;
pub mod shutdown;
pub mod state_cache;

pub use connection::{Frame, PeerConnection};
pub use errors::{ErrorKind, HandlerError, MonitorError, RegistryError};
pub use handler::BrokerHandler;
pub use monitor::{Monitor, QueueHandler};
pub use pump::DeliveryPump;
pub use queue::{inbound_queue, InboundReceiver, InboundSender, QueueItem};
pub use registry::PeerRegistry;
pub use session::PeerSession;
pub use shutdown::{BrokerState, ShutdownCoordinator, ShutdownKind};
pub use state_cache::ProcessStateCache;
