//! Canonical message constructors.
//!
//! Build the broker's own messages through these functions instead of by
//! hand, so wire-shape changes happen in one place.

use chrono::Utc;
use serde_json::{json, Value};

use crate::ids::ProcessId;
use crate::message::PeerMessage;
use crate::schema::refs;

/// Build an error reply to `message`.
///
/// Source and destination are swapped so the reply travels back to the
/// sender, and the correlation id is echoed.
#[must_use]
pub fn error_reply(process_id: &ProcessId, message: &PeerMessage, error: &str) -> PeerMessage {
    let mut reply = PeerMessage::new(refs::MESSAGE_ERROR);
    reply.source = message.destination.clone();
    reply.destination = message.source.clone();
    reply.message_id = message.message_id;
    let _ = reply
        .payload
        .insert("errorMessage".to_owned(), json!(error));
    let _ = reply
        .payload
        .insert("sourceProcessId".to_owned(), json!(process_id.as_str()));
    reply
}

/// Build a process instance document for a newly spawned process.
///
/// Stamps the OS pid, the spawning login, the host name, and the spawn time.
#[must_use]
pub fn process_system_document(process_id: &ProcessId, name: &str) -> PeerMessage {
    let mut doc = PeerMessage::new(refs::PROCESS_SYSTEM);
    let _ = doc.payload.insert("_id".to_owned(), json!(process_id.as_str()));
    let _ = doc.payload.insert("name".to_owned(), json!(name));
    let _ = doc
        .payload
        .insert("systemPid".to_owned(), json!(std::process::id()));
    let _ = doc
        .payload
        .insert("spawnedBy".to_owned(), json!(current_login()));
    let _ = doc.payload.insert("host".to_owned(), json!(hostname()));
    let _ = doc
        .payload
        .insert("spawnedWhen".to_owned(), json!(Utc::now().to_rfc3339()));
    doc
}

/// Build a process state-change log message.
#[must_use]
pub fn process_state_log_message(
    changed_by: &str,
    state: &str,
    process_id: &ProcessId,
    reason: &str,
) -> PeerMessage {
    let mut msg = PeerMessage::new(refs::LOG_PROCESS_STATE);
    let _ = msg.payload.insert("changedBy".to_owned(), json!(changed_by));
    let _ = msg
        .payload
        .insert("changedWhen".to_owned(), json!(Utc::now().to_rfc3339()));
    let _ = msg.payload.insert("state".to_owned(), json!(state));
    let _ = msg.payload.insert("reason".to_owned(), json!(reason));
    let _ = msg
        .payload
        .insert("processId".to_owned(), json!(process_id.as_str()));
    msg
}

/// Describe the broker's runtime environment for the admin surface.
#[must_use]
pub fn environment_document() -> Value {
    json!({
        "hostname": hostname(),
        "platform": std::env::consts::OS,
        "processor": std::env::consts::ARCH,
        "systemPid": std::process::id(),
        "user": current_login(),
        "implementation": {
            "language": "rust",
            "package": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_owned())
}

fn current_login() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_owned())
}
