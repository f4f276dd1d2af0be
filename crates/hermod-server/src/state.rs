//! Shared state accessible from axum handlers.

use std::sync::Arc;
use std::time::Instant;

use hermod_broker::{BrokerHandler, InboundSender, Monitor, PeerRegistry, ShutdownCoordinator};
use hermod_core::ProcessId;
use hermod_store::DocumentStore;

use crate::auth::AuthService;
use crate::config::BrokerConfig;

/// Everything the route handlers reach for.
#[derive(Clone)]
pub struct AppState {
    /// The peer/session registry.
    pub registry: Arc<PeerRegistry>,
    /// The dispatch engine.
    pub monitor: Arc<Monitor>,
    /// The broker's queue handler.
    pub handler: Arc<BrokerHandler>,
    /// The document store.
    pub store: Arc<DocumentStore>,
    /// The shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// The authentication collaborator.
    pub auth: Arc<AuthService>,
    /// Producer half of the shared inbound queue.
    pub inbound: InboundSender,
    /// Server configuration.
    pub config: Arc<BrokerConfig>,
    /// This broker process's id, used for audit documents.
    pub process_id: ProcessId,
    /// When the server started.
    pub start_time: Instant,
}
