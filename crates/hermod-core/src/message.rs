//! The addressed message envelope peers exchange.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A message flowing through the broker.
///
/// The broker cares about four header fields; everything else a peer puts in
/// a message rides along untouched in `payload` (flattened on the wire).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMessage {
    /// Schema reference, e.g. `ref://hermod.message`. Resolves to the
    /// message's category.
    pub schema_ref: String,
    /// Logical address of the sender.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Logical address of the recipient, absent for persist-only messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Correlation id, echoed on replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
    /// All remaining message fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl PeerMessage {
    /// Create a message with the given schema ref and empty payload.
    #[must_use]
    pub fn new(schema_ref: impl Into<String>) -> Self {
        Self {
            schema_ref: schema_ref.into(),
            source: None,
            destination: None,
            message_id: None,
            payload: Map::new(),
        }
    }

    /// Parse a message from raw frame text.
    pub fn from_frame(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize for transmission.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Read a payload field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Read a payload field as a string slice.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Set a payload field, returning self for chaining.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        let _ = self.payload.insert(key.to_owned(), value);
        self
    }

    /// The whole message as a JSON document, headers included. This is the
    /// shape handed to the persistence collaborator.
    #[must_use]
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
