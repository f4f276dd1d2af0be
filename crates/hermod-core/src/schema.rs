//! Schema registry — the validation collaborator at the broker's boundary.
//!
//! Maps schema refs to [`MessageCategory`] and performs the structural
//! checks the broker needs before routing. Unknown schema refs and failed
//! validation are probe-grade: a healthy deployment never produces them, so
//! they are treated as malformed or malicious traffic, not as bugs.

use std::collections::{HashMap, HashSet};

use crate::category::MessageCategory;
use crate::message::PeerMessage;
use crate::principal::PeerType;

/// Well-known schema refs.
pub mod refs {
    /// Plain peer-to-peer message.
    pub const MESSAGE: &str = "ref://hermod.message";
    /// Error reply to a peer message.
    pub const MESSAGE_ERROR: &str = "ref://hermod.message.error";
    /// Control signal for runtime entities.
    pub const CONTROL_SIGNAL: &str = "ref://hermod.control.signal";
    /// Process instance document.
    pub const PROCESS_SYSTEM: &str = "ref://hermod.process.system";
    /// Progress log entry.
    pub const LOG_PROGRESSION: &str = "ref://hermod.log.progression";
    /// Process state-change log entry.
    pub const LOG_PROCESS_STATE: &str = "ref://hermod.log.process_state";
    /// Broker node document.
    pub const NODE_BROKER: &str = "ref://hermod.node.broker";
    /// Admin node document.
    pub const NODE_ADMIN: &str = "ref://hermod.node.admin";
    /// Worker node document.
    pub const NODE_WORKER: &str = "ref://hermod.node.worker";
}

/// Validation failure at the schema boundary. Always probe-grade.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The schema ref is not in the registry.
    #[error("no category found for schema ref {schema_ref}")]
    UnknownSchema {
        /// The offending schema ref.
        schema_ref: String,
    },
    /// A field the category requires is missing.
    #[error("message with schema ref {schema_ref} is missing required field {field}")]
    MissingField {
        /// The message's schema ref.
        schema_ref: String,
        /// The absent field.
        field: &'static str,
    },
}

/// Registry of known schemas: ref → category, plus the intercept set of
/// schema refs the broker persists before routing.
///
/// Built once at startup and read-only afterward.
pub struct SchemaRegistry {
    categories: HashMap<String, MessageCategory>,
    intercept: HashSet<String>,
}

impl SchemaRegistry {
    /// The built-in schema table.
    ///
    /// The intercept set ships empty; deployments that need a routed schema
    /// recorded add it with [`Self::intercepting`].
    #[must_use]
    pub fn builtin() -> Self {
        let mut categories = HashMap::new();
        let _ = categories.insert(refs::MESSAGE.to_owned(), MessageCategory::Message);
        let _ = categories.insert(refs::MESSAGE_ERROR.to_owned(), MessageCategory::Message);
        let _ = categories.insert(refs::CONTROL_SIGNAL.to_owned(), MessageCategory::Control);
        let _ = categories.insert(refs::PROCESS_SYSTEM.to_owned(), MessageCategory::Process);
        let _ = categories.insert(refs::LOG_PROGRESSION.to_owned(), MessageCategory::Log);
        let _ = categories.insert(refs::LOG_PROCESS_STATE.to_owned(), MessageCategory::Log);
        let _ = categories.insert(refs::NODE_BROKER.to_owned(), MessageCategory::Node);
        let _ = categories.insert(refs::NODE_ADMIN.to_owned(), MessageCategory::Node);
        let _ = categories.insert(refs::NODE_WORKER.to_owned(), MessageCategory::Node);
        Self {
            categories,
            intercept: HashSet::new(),
        }
    }

    /// Add a schema ref to the intercept set, returning self for chaining.
    #[must_use]
    pub fn intercepting(mut self, schema_ref: &str) -> Self {
        let _ = self.intercept.insert(schema_ref.to_owned());
        self
    }

    /// Resolve a schema ref to its category. `None` means the ref is
    /// unknown — a probe, reported by the caller without raising.
    #[must_use]
    pub fn category_for(&self, schema_ref: &str) -> Option<MessageCategory> {
        self.categories.get(schema_ref).copied()
    }

    /// Whether the broker must persist this schema before routing it.
    #[must_use]
    pub fn is_intercepted(&self, schema_ref: &str) -> bool {
        self.intercept.contains(schema_ref)
    }

    /// Validate an externally-received message and return its category.
    ///
    /// Checks the ref is known and the fields the category requires are
    /// present: routed categories need a destination, process documents a
    /// name, process-state logs a process id.
    pub fn validate(&self, message: &PeerMessage) -> Result<MessageCategory, SchemaError> {
        let category =
            self.category_for(&message.schema_ref)
                .ok_or_else(|| SchemaError::UnknownSchema {
                    schema_ref: message.schema_ref.clone(),
                })?;

        let missing = |field| SchemaError::MissingField {
            schema_ref: message.schema_ref.clone(),
            field,
        };

        match category {
            MessageCategory::Message | MessageCategory::Control => {
                if message.destination.is_none() {
                    return Err(missing("destination"));
                }
                if message.source.is_none() {
                    return Err(missing("source"));
                }
            }
            MessageCategory::Process => {
                if message.field("name").is_none() {
                    return Err(missing("name"));
                }
            }
            MessageCategory::Log => {
                if message.schema_ref == refs::LOG_PROCESS_STATE
                    && message.field("processId").is_none()
                {
                    return Err(missing("processId"));
                }
            }
            MessageCategory::Node => {}
        }

        Ok(category)
    }

    /// The node schema ref describing a peer type's settings document.
    #[must_use]
    pub fn peer_type_schema_ref(peer_type: PeerType) -> &'static str {
        match peer_type {
            PeerType::Admin => refs::NODE_ADMIN,
            PeerType::Worker => refs::NODE_WORKER,
            PeerType::Broker => refs::NODE_BROKER,
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
