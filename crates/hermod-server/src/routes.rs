//! HTTP surface of the broker.
//!
//! `/register` issues sessions, `/socket` upgrades to the message channel,
//! `/control` stops or restarts the broker, and `/status`, `/health`,
//! `/peers`, `/environment` are the read side. Everything except
//! `/register`, `/status`, and `/health` requires a session id issued at
//! registration, presented in the `x-session-id` header.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use hermod_broker::{PeerSession, ShutdownKind};
use hermod_core::{factory, PeerType, SchemaRegistry, SessionId};

use crate::auth::Credentials;
use crate::state::AppState;
use crate::ws;

/// Build the broker router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/socket", get(ws::socket))
        .route("/control", post(control))
        .route("/peers", get(peers))
        .route("/environment", get(environment))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve the caller's session from the `x-session-id` header.
fn authenticated_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<PeerSession>, StatusCode> {
    let session_id = headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    state
        .registry
        .session(&SessionId::from(session_id))
        .ok_or(StatusCode::UNAUTHORIZED)
}

/// GET /status — liveness probe, no session required.
async fn status() -> &'static str {
    "up"
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "connections": state.registry.live_connections().len(),
        "sessions": state.registry.session_count(),
        "shutting_down": state.shutdown.is_shutting_down(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    credentials: Credentials,
    peer_type: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    environment: Option<Value>,
}

/// POST /register — authenticate and create a peer session.
///
/// Admin peers may omit their address; one is generated from the login
/// name. Every other peer type must state one.
async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Response {
    let remote_addr = remote_of(&headers);

    let Ok(peer_type) = PeerType::from_str(&request.peer_type) else {
        warn!(peer_type = %request.peer_type, %remote_addr, "registration with invalid peer type");
        return StatusCode::BAD_REQUEST.into_response();
    };

    let principal = match state.auth.authenticate(&request.credentials).await {
        Ok(principal) => principal,
        Err(_) => {
            warn!(%remote_addr, "registration failed authentication");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let address = match request.address {
        Some(address) if !address.is_empty() => address,
        _ if peer_type.may_omit_address() => format!("{peer_type}_{}", principal.name),
        _ => {
            warn!(%remote_addr, %peer_type, "peer type must state an address");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let session = PeerSession::new(address.clone(), principal, remote_addr.clone(), peer_type);
    let session_id = session.id.clone();
    state.registry.create_session(session);
    if let Some(environment) = &request.environment {
        tracing::debug!(%address, ?environment, "peer environment recorded");
    }
    info!(%remote_addr, %address, %peer_type, "peer registered");

    Json(json!({
        "sessionId": session_id,
        "settings": {
            "schemaRef": SchemaRegistry::peer_type_schema_ref(peer_type),
            "address": address,
        },
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    command: String,
    reason: String,
}

/// POST /control — stop or restart the broker.
///
/// Executes asynchronously: the acknowledgement goes out immediately and
/// the shutdown sequence runs off this request's task.
async fn control(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ControlRequest>,
) -> Response {
    let session = match authenticated_session(&state, &headers) {
        Ok(session) => session,
        Err(status) => return status.into_response(),
    };

    let kind = match request.command.as_str() {
        "stop" => ShutdownKind::Stop,
        "restart" => ShutdownKind::Restart,
        other => {
            warn!(command = other, "unknown broker control command");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    info!(command = %request.command, reason = %request.reason, user = %session.principal.name, "broker control");
    let user_id = session.principal.id.clone();
    let _ = tokio::spawn(async move {
        let _ = state
            .shutdown
            .execute(
                &state.monitor,
                &state.handler,
                &state.store,
                &state.process_id,
                kind,
                &request.reason,
                &user_id,
            )
            .await;
    });

    Json(json!({})).into_response()
}

/// GET /peers — all logged-in peers, queues and connections elided.
async fn peers(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match authenticated_session(&state, &headers) {
        Ok(_) => Json(state.registry.peers_snapshot()).into_response(),
        Err(status) => status.into_response(),
    }
}

/// GET /environment — the broker's runtime environment.
async fn environment(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match authenticated_session(&state, &headers) {
        Ok(_) => Json(factory::environment_document()).into_response(),
        Err(status) => status.into_response(),
    }
}

fn remote_of(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("local")
        .to_owned()
}
