//! Peer session state.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use hermod_core::{PeerMessage, PeerType, Principal, SessionId};

use crate::connection::PeerConnection;

/// One logical peer currently known to the broker.
///
/// Created when a client completes registration; its connection is attached
/// when the transport upgrade completes. The outbound queue belongs to the
/// session, not the connection: the delivery pump borrows the receiver while
/// a connection is live and parks it back on detach.
pub struct PeerSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Logical, human-meaningful address, e.g. `admin_root`.
    pub address: String,
    /// The authenticated principal, trusted for audit attribution.
    pub principal: Principal,
    /// Origin network identity.
    pub remote_addr: String,
    /// Peer-type tag.
    pub peer_type: PeerType,
    outbound_tx: mpsc::UnboundedSender<PeerMessage>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<PeerMessage>>>,
    connection: Mutex<Option<Arc<PeerConnection>>>,
}

impl PeerSession {
    /// Create a session with a fresh outbound queue and no connection.
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        principal: Principal,
        remote_addr: impl Into<String>,
        peer_type: PeerType,
    ) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: SessionId::new(),
            address: address.into(),
            principal,
            remote_addr: remote_addr.into(),
            peer_type,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            connection: Mutex::new(None),
        })
    }

    /// Push a message onto this peer's private outbound queue, waking its
    /// delivery pump. Returns `false` if the queue has been torn down.
    pub fn queue_message(&self, message: PeerMessage) -> bool {
        self.outbound_tx.send(message).is_ok()
    }

    /// Borrow the outbound receiver for a delivery pump. `None` while a
    /// pump already holds it.
    #[must_use]
    pub fn take_outbound_rx(&self) -> Option<mpsc::UnboundedReceiver<PeerMessage>> {
        self.outbound_rx.lock().take()
    }

    /// Return the outbound receiver after a pump exits, so queued messages
    /// survive the pump.
    pub fn park_outbound_rx(&self, rx: mpsc::UnboundedReceiver<PeerMessage>) {
        *self.outbound_rx.lock() = Some(rx);
    }

    /// The attached live connection, if any.
    #[must_use]
    pub fn connection(&self) -> Option<Arc<PeerConnection>> {
        self.connection.lock().clone()
    }

    /// Whether a connection is currently attached.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.connection.lock().is_some()
    }

    pub(crate) fn attach(&self, conn: Arc<PeerConnection>) {
        *self.connection.lock() = Some(conn);
    }

    pub(crate) fn detach(&self) -> Option<Arc<PeerConnection>> {
        self.connection.lock().take()
    }

    /// Detach only if the given connection is the one attached, so a stale
    /// connection's cleanup cannot drop a newer attachment.
    pub(crate) fn detach_if(&self, conn_id: &hermod_core::ConnectionId) -> bool {
        let mut slot = self.connection.lock();
        if slot.as_ref().is_some_and(|attached| attached.id == *conn_id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Serializable view of this session with the queue and connection
    /// elided, for the peers listing.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        json!({
            "sessionId": self.id,
            "address": self.address,
            "user": self.principal,
            "ip": self.remote_addr,
            "type": self.peer_type,
            "live": self.is_live(),
        })
    }
}
