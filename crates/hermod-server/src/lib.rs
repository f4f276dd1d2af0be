//! # hermod-server
//!
//! The transport boundary of the Hermod broker: an axum HTTP + WebSocket
//! server exposing peer registration, the socket upgrade, the stop/restart
//! control surface, and the status/health/peers read endpoints.
//!
//! The routing core never touches axum — this crate translates between the
//! wire and the core's three entry points: register on open, enqueue on
//! message, unregister on close.

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod routes;
pub mod state;
pub mod ws;

pub use auth::{AuthError, AuthService, Credentials};
pub use config::{BrokerConfig, UserConfig};
pub use routes::build_router;
pub use state::AppState;
