//! Message categories.
//!
//! A category is the coarse classification a message's schema resolves to.
//! It is the key of the broker's dispatch table: `Message` and `Control`
//! route peer-to-peer, `Process` and `Log` are intercepted and persisted,
//! `Node` belongs to the node-tree surface and has no broker dispatch entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse classification of a [`crate::PeerMessage`], derived from its
/// schema ref by the [`crate::SchemaRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    /// Peer-to-peer message, forwarded by the broker to its destination.
    Message,
    /// Control message for runtime entities; routed like `Message`.
    Control,
    /// Process instance data, written to the process collection.
    Process,
    /// Log entries, written to the log collection.
    Log,
    /// Node-tree documents; never dispatched by the broker itself.
    Node,
}

impl MessageCategory {
    /// All categories, in dispatch-table iteration order.
    pub const ALL: [Self; 5] = [
        Self::Message,
        Self::Control,
        Self::Process,
        Self::Log,
        Self::Node,
    ];
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Control => write!(f, "control"),
            Self::Process => write!(f, "process"),
            Self::Log => write!(f, "log"),
            Self::Node => write!(f, "node"),
        }
    }
}

impl FromStr for MessageCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "control" => Ok(Self::Control),
            "process" => Ok(Self::Process),
            "log" => Ok(Self::Log),
            "node" => Ok(Self::Node),
            other => Err(UnknownCategory(other.to_owned())),
        }
    }
}

/// Error returned when parsing an unrecognized category name.
#[derive(Debug, thiserror::Error)]
#[error("unknown message category: {0}")]
pub struct UnknownCategory(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_roundtrip() {
        for cat in MessageCategory::ALL {
            let parsed: MessageCategory = cat.to_string().parse().unwrap();
            assert_eq!(parsed, cat);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "telemetry".parse::<MessageCategory>().unwrap_err();
        assert!(err.to_string().contains("telemetry"));
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_string(&MessageCategory::Process).unwrap();
        assert_eq!(json, "\"process\"");
    }
}
