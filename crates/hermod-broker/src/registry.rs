//! The peer session registry.
//!
//! Owns the `session id → PeerSession` and `address → session id` maps.
//! Both maps live under one reader-writer lock: register, unregister, and
//! eviction are read-modify-write sequences under the write half, routing
//! lookups take the read half. The invariant is that an address entry exists
//! if and only if the referenced session's connection is attached.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use hermod_core::{CloseCode, SessionId};

use crate::connection::PeerConnection;
use crate::errors::RegistryError;
use crate::session::PeerSession;

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Arc<PeerSession>>,
    addresses: HashMap<String, SessionId>,
}

/// Registry of peer sessions and their addresses.
pub struct PeerRegistry {
    inner: RwLock<Inner>,
}

impl PeerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert a freshly authenticated session (no connection yet).
    pub fn create_session(&self, session: Arc<PeerSession>) {
        let mut inner = self.inner.write();
        debug!(session_id = %session.id, address = %session.address, "session created");
        let _ = inner.sessions.insert(session.id.clone(), session);
    }

    /// Look up a session by id.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<Arc<PeerSession>> {
        self.inner.read().sessions.get(id).cloned()
    }

    /// Remove a session entirely, detaching any connection and dropping its
    /// address entry.
    pub fn remove_session(&self, id: &SessionId) -> Option<Arc<PeerSession>> {
        let mut inner = self.inner.write();
        let session = inner.sessions.remove(id)?;
        if inner.addresses.get(&session.address) == Some(id) {
            let _ = inner.addresses.remove(&session.address);
        }
        let _ = session.detach();
        Some(session)
    }

    /// Attach a connection to its session and publish the session's address.
    ///
    /// Fails if the connection's session id is unknown. An existing entry
    /// for the address is logged and overwritten — eviction of the prior
    /// registration is [`Self::register_replacing`]'s job, before this runs.
    pub fn register(
        &self,
        conn: &Arc<PeerConnection>,
    ) -> Result<Arc<PeerSession>, RegistryError> {
        let mut inner = self.inner.write();
        Self::register_locked(&mut inner, conn)
    }

    /// Attach a connection, first evicting any live session already holding
    /// the same address.
    ///
    /// The evicted peer's connection is closed with `UnexpectedCondition`
    /// so it knows it was displaced by a new login, and its session is
    /// destroyed. Returns the new session and the evicted connection, if
    /// one was closed.
    pub fn register_replacing(
        &self,
        conn: &Arc<PeerConnection>,
    ) -> Result<(Arc<PeerSession>, Option<Arc<PeerConnection>>), RegistryError> {
        let mut inner = self.inner.write();

        let address = inner
            .sessions
            .get(&conn.session_id)
            .ok_or_else(|| RegistryError::UnknownSession(conn.session_id.clone()))?
            .address
            .clone();

        let mut evicted = None;
        if let Some(old_id) = inner.addresses.get(&address).cloned() {
            if old_id != conn.session_id {
                if let Some(old_session) = inner.sessions.remove(&old_id) {
                    info!(
                        address,
                        old_session_id = %old_id,
                        "address re-registered, evicting previous session"
                    );
                    if let Some(old_conn) = old_session.detach() {
                        let _ =
                            old_conn.close(CloseCode::UnexpectedCondition, "peer logging in again");
                        evicted = Some(old_conn);
                    }
                }
                let _ = inner.addresses.remove(&address);
            }
        }

        let session = Self::register_locked(&mut inner, conn)?;
        Ok((session, evicted))
    }

    fn register_locked(
        inner: &mut Inner,
        conn: &Arc<PeerConnection>,
    ) -> Result<Arc<PeerSession>, RegistryError> {
        let session = inner
            .sessions
            .get(&conn.session_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSession(conn.session_id.clone()))?;

        conn.set_address(&session.address);
        session.attach(conn.clone());

        if inner.addresses.contains_key(&session.address) {
            warn!(
                address = %session.address,
                "peer was already registered; earlier failure to unregister? overwriting"
            );
        }
        let _ = inner
            .addresses
            .insert(session.address.clone(), session.id.clone());
        debug!(address = %session.address, session_id = %session.id, "peer registered");
        Ok(session)
    }

    /// Detach a connection and drop its address entry.
    ///
    /// Best-effort: unregister runs during error unwinding, so a missing
    /// address entry or an already-detached session is logged, never raised.
    pub fn unregister(&self, conn: &PeerConnection) {
        let mut inner = self.inner.write();

        if let Some(address) = conn.address() {
            if inner.addresses.get(&address) == Some(&conn.session_id) {
                let _ = inner.addresses.remove(&address);
            } else {
                debug!(address, "peer was not registered at unregister");
            }
        }

        match inner.sessions.get(&conn.session_id) {
            Some(session) => {
                if !session.detach_if(&conn.id) {
                    debug!(
                        session_id = %conn.session_id,
                        "no attached connection to remove at unregister"
                    );
                }
            }
            None => {
                debug!(session_id = %conn.session_id, "unknown session at unregister");
            }
        }
        debug!(session_id = %conn.session_id, connection_id = %conn.id, "peer unregistered");
    }

    /// Resolve an address to its live session, for routing.
    #[must_use]
    pub fn lookup(&self, address: &str) -> Option<Arc<PeerSession>> {
        let inner = self.inner.read();
        let id = inner.addresses.get(address)?;
        inner.sessions.get(id).cloned()
    }

    /// Every connection currently attached to a session.
    #[must_use]
    pub fn live_connections(&self) -> Vec<Arc<PeerConnection>> {
        self.inner
            .read()
            .sessions
            .values()
            .filter_map(|s| s.connection())
            .collect()
    }

    /// Number of known sessions, live or pending.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Number of published addresses.
    #[must_use]
    pub fn address_count(&self) -> usize {
        self.inner.read().addresses.len()
    }

    /// Serializable view of all sessions, queues and connections elided.
    #[must_use]
    pub fn peers_snapshot(&self) -> Vec<Value> {
        self.inner
            .read()
            .sessions
            .values()
            .map(|s| s.snapshot())
            .collect()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
