//! Peer connection state.
//!
//! A `PeerConnection` stands between the routing core and one attached
//! transport: outbound frames go onto its frame channel, which the transport
//! write task drains into the socket. Closing is idempotent — the first
//! close wins and its code is what the peer sees.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hermod_core::{CloseCode, ConnectionId, PeerMessage, SessionId};

/// A frame bound for the peer's transport.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A serialized message.
    Text(String),
    /// Close the connection with a code and human-readable reason.
    Close {
        /// Close code the peer uses to pick a reconnect strategy.
        code: CloseCode,
        /// Reason string.
        reason: String,
    },
}

/// One attached transport connection.
pub struct PeerConnection {
    /// Unique connection id.
    pub id: ConnectionId,
    /// The session this connection authenticated as.
    pub session_id: SessionId,
    /// Remote network identity, for logging.
    pub remote_addr: String,
    address: Mutex<Option<String>>,
    frame_tx: mpsc::UnboundedSender<Frame>,
    pump_cancel: CancellationToken,
    close_state: Mutex<Option<(CloseCode, String)>>,
}

impl PeerConnection {
    /// Create a connection and the receiver the transport write task drains.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        remote_addr: impl Into<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Frame>) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            session_id,
            remote_addr: remote_addr.into(),
            address: Mutex::new(None),
            frame_tx,
            pump_cancel: CancellationToken::new(),
            close_state: Mutex::new(None),
        });
        (conn, frame_rx)
    }

    /// The logical address recorded at registration, if registered.
    #[must_use]
    pub fn address(&self) -> Option<String> {
        self.address.lock().clone()
    }

    pub(crate) fn set_address(&self, address: &str) {
        *self.address.lock() = Some(address.to_owned());
    }

    /// Send a serialized frame. Returns `false` if the transport side is
    /// gone or the connection is closed.
    pub fn send_text(&self, text: String) -> bool {
        if self.is_closed() {
            return false;
        }
        self.frame_tx.send(Frame::Text(text)).is_ok()
    }

    /// Serialize and send a message.
    pub fn send_message(&self, message: &PeerMessage) -> bool {
        match message.to_frame() {
            Ok(text) => self.send_text(text),
            Err(_) => false,
        }
    }

    /// Close the connection with a code and reason.
    ///
    /// Idempotent: only the first call emits a close frame and cancels the
    /// delivery pump. Returns `true` if this call performed the close.
    pub fn close(&self, code: CloseCode, reason: &str) -> bool {
        {
            let mut state = self.close_state.lock();
            if state.is_some() {
                return false;
            }
            *state = Some((code, reason.to_owned()));
        }
        let _ = self.frame_tx.send(Frame::Close {
            code,
            reason: reason.to_owned(),
        });
        self.pump_cancel.cancel();
        true
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close_state.lock().is_some()
    }

    /// The code of the first close, if any.
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        self.close_state.lock().as_ref().map(|(code, _)| *code)
    }

    /// Token cancelled when this connection's pump must stop.
    #[must_use]
    pub fn pump_token(&self) -> CancellationToken {
        self.pump_cancel.clone()
    }
}
