//! The broker's queue handler.
//!
//! Resolves each message's category through the schema registry, routes
//! peer-to-peer traffic through the registry, and intercepts process and
//! log messages for persistence. Category selection goes through a typed
//! dispatch table built once at construction: base defaults send `Message`
//! and `Control` through routing, and the broker extends the table with the
//! persistence entries. `Node` is a known category with no entry — hitting
//! it is an internal configuration error, not a probe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, error, warn};

use hermod_core::schema::refs;
use hermod_core::{factory, CloseCode, MessageCategory, PeerMessage, ProcessId, SchemaRegistry};
use hermod_store::{Collection, DocumentStore};

use crate::connection::PeerConnection;
use crate::errors::{ErrorKind, HandlerError};
use crate::monitor::QueueHandler;
use crate::queue::QueueItem;
use crate::registry::PeerRegistry;
use crate::state_cache::ProcessStateCache;

/// What the broker does with a category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CategoryAction {
    /// Forward to the destination peer's outbound queue.
    Route,
    /// Write to the process collection.
    PersistProcess,
    /// Write to the log collection and update the state cache.
    PersistLog,
}

/// The concrete handler behind the dispatch engine.
pub struct BrokerHandler {
    process_id: ProcessId,
    own_address: String,
    registry: Arc<PeerRegistry>,
    schemas: Arc<SchemaRegistry>,
    store: Arc<DocumentStore>,
    states: Arc<ProcessStateCache>,
    actions: HashMap<MessageCategory, CategoryAction>,
    shutdown_code: Mutex<CloseCode>,
    persistence_failures: AtomicU64,
}

impl BrokerHandler {
    /// Build the handler and its category dispatch table.
    #[must_use]
    pub fn new(
        process_id: ProcessId,
        own_address: impl Into<String>,
        registry: Arc<PeerRegistry>,
        schemas: Arc<SchemaRegistry>,
        store: Arc<DocumentStore>,
        states: Arc<ProcessStateCache>,
    ) -> Self {
        let mut actions = Self::base_actions();
        let _ = actions.insert(MessageCategory::Process, CategoryAction::PersistProcess);
        let _ = actions.insert(MessageCategory::Log, CategoryAction::PersistLog);

        Self {
            process_id,
            own_address: own_address.into(),
            registry,
            schemas,
            store,
            states,
            actions,
            shutdown_code: Mutex::new(CloseCode::ShuttingDown),
            persistence_failures: AtomicU64::new(0),
        }
    }

    /// The default table: plain and control messages are routed.
    fn base_actions() -> HashMap<MessageCategory, CategoryAction> {
        let mut actions = HashMap::new();
        let _ = actions.insert(MessageCategory::Message, CategoryAction::Route);
        let _ = actions.insert(MessageCategory::Control, CategoryAction::Route);
        actions
    }

    /// Whether a category has a dispatch entry.
    #[must_use]
    pub fn dispatches(&self, category: MessageCategory) -> bool {
        self.actions.contains_key(&category)
    }

    /// The close code `shut_down` uses; the shutdown coordinator swaps in
    /// `Restarting` when the broker is coming back.
    pub fn set_shutdown_code(&self, code: CloseCode) {
        *self.shutdown_code.lock() = code;
    }

    /// Persistence failures observed so far. Such failures never block
    /// routing or shutdown; they are logged and counted here.
    #[must_use]
    pub fn persistence_failure_count(&self) -> u64 {
        self.persistence_failures.load(Ordering::Relaxed)
    }

    /// Resolve the dispatch action for a category.
    ///
    /// A schema ref that resolved to no category never reaches this point;
    /// a known category without a table entry is a configuration defect.
    fn get_action(&self, category: MessageCategory) -> Result<CategoryAction, HandlerError> {
        self.actions.get(&category).copied().ok_or_else(|| {
            HandlerError::Internal(format!("no handler for category: {category}"))
        })
    }

    /// Log an error and, when the sender is external, optionally reply
    /// and/or close its connection.
    fn handle_error(
        &self,
        error: &HandlerError,
        origin: Option<&Arc<PeerConnection>>,
        reply_to: Option<&PeerMessage>,
        close_code: Option<CloseCode>,
    ) {
        match error.kind() {
            ErrorKind::Probe => warn!(error = %error, "probe-grade message rejected"),
            ErrorKind::Internal => error!(error = %error, "internal error handling message"),
            ErrorKind::Persistence => error!(error = %error, "persistence failure"),
        }
        if let Some(conn) = origin {
            if let Some(message) = reply_to {
                let reply = factory::error_reply(&self.process_id, message, &error.to_string());
                let _ = conn.send_message(&reply);
            }
            if let Some(code) = close_code {
                let _ = conn.close(code, &error.to_string());
            }
        }
    }

    /// Route a peer-to-peer message to its destination's outbound queue.
    async fn route_message(
        &self,
        origin: Option<&Arc<PeerConnection>>,
        message: &mut PeerMessage,
    ) -> Result<(), HandlerError> {
        if origin.is_some() {
            let _ = self.schemas.validate(message)?;
        } else {
            // Internally generated; the broker is the sender.
            message.source = Some(self.own_address.clone());
        }

        // Intercept categories are recorded before routing continues; a
        // failed write must not cost the peer its message.
        if self.schemas.is_intercepted(&message.schema_ref) {
            if let Err(err) = self.persist_log(origin, message) {
                let _ = self.persistence_failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %err, "failed to persist intercepted message");
            }
        }

        let destination = message
            .destination
            .clone()
            .ok_or_else(|| HandlerError::Probe("message has no destination".to_owned()))?;

        if destination == self.own_address {
            error!("broker was the addressee; the broker is never a destination for a plain message");
            return Ok(());
        }

        match self.registry.lookup(&destination) {
            Some(session) => {
                if !session.queue_message(message.clone()) {
                    warn!(destination, "destination queue torn down, message dropped");
                }
                Ok(())
            }
            None => {
                if let Some(conn) = origin {
                    let _ = conn.close(
                        CloseCode::UnacceptableData,
                        &format!("Missing or invalid destination = {destination}"),
                    );
                    Ok(())
                } else {
                    Err(HandlerError::Internal(format!(
                        "Missing or invalid destination = {destination}"
                    )))
                }
            }
        }
    }

    /// Write incoming process information to the process collection.
    fn persist_process(
        &self,
        origin: Option<&Arc<PeerConnection>>,
        message: &PeerMessage,
    ) -> Result<(), HandlerError> {
        let author = origin
            .and_then(|conn| self.registry.session(&conn.session_id))
            .map(|session| session.principal.clone());
        debug!(schema_ref = %message.schema_ref, "saving process information");
        let _ = self
            .store
            .persist(Collection::Process, &message.to_document(), author.as_ref())?;
        debug!("process document persisted");
        Ok(())
    }

    /// Write a log item to the log collection, attributing authorship to
    /// the sending peer, and track process-state changes in the cache.
    fn persist_log(
        &self,
        origin: Option<&Arc<PeerConnection>>,
        message: &PeerMessage,
    ) -> Result<(), HandlerError> {
        let mut document = message.to_document();
        let session = origin.and_then(|conn| self.registry.session(&conn.session_id));
        let author = session.as_ref().map(|s| s.principal.clone());
        if let Some(session) = &session {
            document["writtenBy"] = json!(session.principal.id);
            document["address"] = json!(session.address);
        }

        let _ = self
            .store
            .persist(Collection::Log, &document, author.as_ref())?;
        debug!(schema_ref = %message.schema_ref, "log document persisted");

        if message.schema_ref == refs::LOG_PROCESS_STATE {
            if let Some(process_id) = message.field_str("processId") {
                self.states.upsert(process_id, document);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QueueHandler for BrokerHandler {
    async fn handle(&self, item: QueueItem) -> Result<(), HandlerError> {
        let QueueItem {
            origin,
            mut message,
        } = item;

        match origin.as_ref().and_then(|conn| conn.address()) {
            Some(address) => debug!(%address, schema_ref = %message.schema_ref, "handling message"),
            None => debug!(schema_ref = %message.schema_ref, "handling internal message"),
        }

        // An unknown schema ref is a probe, reported without raising.
        let Some(category) = self.schemas.category_for(&message.schema_ref) else {
            let err = HandlerError::Probe(format!(
                "no category found for schema ref {}",
                message.schema_ref
            ));
            self.handle_error(&err, origin.as_ref(), None, None);
            return Ok(());
        };

        // A known category with no dispatch entry is raised to the monitor.
        let action = self.get_action(category)?;

        let result = match action {
            CategoryAction::Route => self.route_message(origin.as_ref(), &mut message).await,
            CategoryAction::PersistProcess => self.persist_process(origin.as_ref(), &message),
            CategoryAction::PersistLog => self.persist_log(origin.as_ref(), &message),
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) => match err.kind() {
                // Probe failures answer the sender when there is one.
                ErrorKind::Probe => {
                    self.handle_error(&err, origin.as_ref(), Some(&message), None);
                    Ok(())
                }
                // Persistence failures are counted and never block routing.
                ErrorKind::Persistence => {
                    let _ = self.persistence_failures.fetch_add(1, Ordering::Relaxed);
                    self.handle_error(&err, origin.as_ref(), None, None);
                    Ok(())
                }
                ErrorKind::Internal => {
                    if origin.is_some() {
                        self.handle_error(&err, origin.as_ref(), None, None);
                        Ok(())
                    } else {
                        // No one to reply to; raise instead of swallowing.
                        Err(err)
                    }
                }
            },
        }
    }

    async fn shut_down(&self, user_id: &str) {
        let code = *self.shutdown_code.lock();
        debug!(user_id, code = %code, "closing peer connections");
        for conn in self.registry.live_connections() {
            debug!(address = ?conn.address(), "closing");
            let _ = conn.close(code, "Shutting down");
        }
    }
}
