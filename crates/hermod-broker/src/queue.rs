//! The shared inbound queue.
//!
//! Every inbound frame — and every internally synthesized message — is
//! pushed here as a [`QueueItem`] and consumed, in order, by the single
//! dispatch loop in [`crate::Monitor`].

use std::sync::Arc;

use tokio::sync::mpsc;

use hermod_core::PeerMessage;

use crate::connection::PeerConnection;

/// The unit flowing through the shared inbound queue.
#[derive(Clone)]
pub struct QueueItem {
    /// The connection the message arrived on; `None` marks an internally
    /// generated message with no reply-to-sender path.
    pub origin: Option<Arc<PeerConnection>>,
    /// The message itself.
    pub message: PeerMessage,
}

impl QueueItem {
    /// Item for a message received from an external connection.
    #[must_use]
    pub fn external(origin: Arc<PeerConnection>, message: PeerMessage) -> Self {
        Self {
            origin: Some(origin),
            message,
        }
    }

    /// Item for an internally generated message.
    #[must_use]
    pub fn internal(message: PeerMessage) -> Self {
        Self {
            origin: None,
            message,
        }
    }
}

/// Producer half of the shared inbound queue. Cheap to clone; one clone per
/// connection-accept path plus any internal producers.
pub type InboundSender = mpsc::UnboundedSender<QueueItem>;

/// Consumer half; owned by exactly one [`crate::Monitor`].
pub type InboundReceiver = mpsc::UnboundedReceiver<QueueItem>;

/// Create the shared inbound queue.
#[must_use]
pub fn inbound_queue() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}
