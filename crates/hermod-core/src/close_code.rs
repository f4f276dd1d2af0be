//! WebSocket close codes.
//!
//! The numeric values follow RFC 6455 §7.4.1, plus two private application
//! codes clients use to pick a reconnect strategy: `Restarting` (4011, the
//! broker is coming right back — reconnect after a short backoff) and
//! `ShuttingDown` (4012 — back off longer and reconnect periodically).
//! These values are part of the wire contract and must not change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Close code sent when terminating a peer connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// 1000 indicates a normal closure: the purpose of the connection has
    /// been fulfilled.
    NormalClosure = 1000,
    /// 1001 indicates the endpoint is going away.
    GoingAway = 1001,
    /// 1002 indicates termination due to a protocol error, such as a
    /// malformed message.
    ProtocolError = 1002,
    /// 1003 indicates the endpoint received data it cannot accept, such as
    /// a message routed to an unknown destination.
    UnacceptableData = 1003,
    /// 1008 indicates a message violated the endpoint's policy.
    PolicyViolation = 1008,
    /// 1009 indicates a message was too big to process.
    TooBig = 1009,
    /// 1010 indicates the client expected the server to negotiate an
    /// extension it did not.
    BadServerResponse = 1010,
    /// 1011 indicates the server hit an unexpected condition, such as a
    /// peer evicted by a re-registration for the same address.
    UnexpectedCondition = 1011,
    /// 1015 is reserved for TLS handshake failure.
    TlsFailure = 1015,
    /// 4011 is a private code: the broker is restarting, reconnect shortly.
    Restarting = 4011,
    /// 4012 is a private code: the broker is shutting down, back off longer
    /// and reconnect periodically.
    ShuttingDown = 4012,
}

impl CloseCode {
    /// The numeric wire value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value into a known close code.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::NormalClosure),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::ProtocolError),
            1003 => Some(Self::UnacceptableData),
            1008 => Some(Self::PolicyViolation),
            1009 => Some(Self::TooBig),
            1010 => Some(Self::BadServerResponse),
            1011 => Some(Self::UnexpectedCondition),
            1015 => Some(Self::TlsFailure),
            4011 => Some(Self::Restarting),
            4012 => Some(Self::ShuttingDown),
            _ => None,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}
