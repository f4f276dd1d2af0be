//! Authenticated identity and peer typing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The authenticated identity behind a peer session.
///
/// Supplied by the authentication collaborator at registration time; the
/// broker trusts it for audit attribution only and performs no authorization
/// logic of its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Stable user id.
    pub id: String,
    /// Login name.
    pub name: String,
}

impl Principal {
    /// Create a principal.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The kind of peer registering with the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerType {
    /// Administrative UI. May omit an address at registration; one is
    /// generated from the login name.
    Admin,
    /// Worker agent. Must state an address.
    Worker,
    /// Another broker. Must state an address.
    Broker,
}

impl PeerType {
    /// Whether this peer type may register without stating an address.
    #[must_use]
    pub const fn may_omit_address(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for PeerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Worker => write!(f, "worker"),
            Self::Broker => write!(f, "broker"),
        }
    }
}

impl FromStr for PeerType {
    type Err = InvalidPeerType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "worker" => Ok(Self::Worker),
            "broker" => Ok(Self::Broker),
            other => Err(InvalidPeerType(other.to_owned())),
        }
    }
}

/// Error returned for an unrecognized peer type name.
#[derive(Debug, thiserror::Error)]
#[error("invalid peer type: {0}")]
pub struct InvalidPeerType(pub String);
