//! Broker error types.
//!
//! The routing core keeps a hard two-tier distinction: probe-grade failures
//! (malformed or malicious traffic — logged, possibly answered with a close,
//! never fatal) versus internal failures (configuration or queue defects —
//! raised loudly). Persistence failures form a third tier that is logged and
//! counted but never blocks routing or shutdown.

use hermod_core::{SchemaError, SessionId};
use hermod_store::StoreError;
use thiserror::Error;

/// Classification of a [`HandlerError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or malicious traffic; never a bug.
    Probe,
    /// A defect in the broker's own configuration or plumbing.
    Internal,
    /// The document store failed; routing continues.
    Persistence,
}

/// Error raised while handling one queue item.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Probe-grade failure.
    #[error("{0}")]
    Probe(String),

    /// Internal failure.
    #[error("{0}")]
    Internal(String),

    /// Document store failure.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl HandlerError {
    /// Which tier this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Probe(_) => ErrorKind::Probe,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl From<SchemaError> for HandlerError {
    fn from(err: SchemaError) -> Self {
        Self::Probe(err.to_string())
    }
}

/// Errors from the dispatch engine's lifecycle operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// `start` was called while the consumer is running.
    #[error("the queue monitor is already running")]
    AlreadyRunning,

    /// The monitor was terminated; a new one must be constructed.
    #[error("the queue monitor has terminated and cannot be restarted")]
    Terminated,

    /// `stop` was called before `start`.
    #[error("the queue monitor is not running")]
    NotRunning,
}

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The connection presented a session id the registry does not know.
    /// An invalid session must never be registered.
    #[error("invalid session id: {0}")]
    UnknownSession(SessionId),
}
