//! WebSocket session lifecycle — carries one peer's connection from upgrade
//! through disconnect.
//!
//! On open the connection registers (evicting any stale registration for
//! the same address) and gets its delivery pump; inbound text frames are
//! parsed and pushed onto the shared inbound queue; on close the connection
//! unregisters and the pump is cancelled.

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, instrument, warn};

use hermod_broker::{DeliveryPump, Frame, PeerConnection, QueueItem};
use hermod_core::{CloseCode, PeerMessage, SessionId};

use crate::state::AppState;

/// GET /socket — upgrade to the peer message channel.
///
/// The session id issued at `/register` rides the `session_id` query
/// parameter. An unknown or missing id is a probe: rejected before the
/// upgrade, no session state touched.
pub async fn socket(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(session_id) = params.get("session_id").map(|s| SessionId::from(s.as_str())) else {
        warn!("socket upgrade without a session id");
        return StatusCode::BAD_REQUEST.into_response();
    };
    if state.registry.session(&session_id).is_none() {
        warn!(%session_id, "socket upgrade with an unknown session id");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| run_ws_session(socket, state, session_id))
}

/// Run one peer's WebSocket session.
#[instrument(skip_all, fields(session_id = %session_id))]
async fn run_ws_session(ws: WebSocket, state: AppState, session_id: SessionId) {
    let remote_addr = state
        .registry
        .session(&session_id)
        .map_or_else(|| "unknown".to_owned(), |s| s.remote_addr.clone());
    let (conn, mut frame_rx) = PeerConnection::new(session_id, remote_addr);

    let session = match state.registry.register_replacing(&conn) {
        Ok((session, evicted)) => {
            if evicted.is_some() {
                debug!(address = %session.address, "previous connection evicted");
            }
            session
        }
        Err(err) => {
            // The session vanished between the upgrade check and now.
            warn!(error = %err, "failed to register socket");
            return;
        }
    };
    info!(address = %session.address, "peer connected");

    let pump = DeliveryPump::spawn(session.clone(), conn.clone());

    let (mut ws_tx, mut ws_rx) = ws.split();

    // Writer: drain the connection's frame channel into the socket. A close
    // frame carries the recorded code and ends the session.
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            match frame {
                Frame::Text(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Frame::Close { code, reason } => {
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: code.as_u16(),
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Reader: parse frames and enqueue them for the dispatch engine.
    while let Some(Ok(message)) = ws_rx.next().await {
        let text = match message {
            Message::Text(text) => Some(text.to_string()),
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => Some(text.to_owned()),
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    None
                }
            },
            Message::Close(_) => {
                debug!("peer sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => None,
        };
        let Some(text) = text else { continue };
        if text.is_empty() {
            continue;
        }

        match PeerMessage::from_frame(&text) {
            Ok(parsed) => {
                if state
                    .inbound
                    .send(QueueItem::external(conn.clone(), parsed))
                    .is_err()
                {
                    warn!("inbound queue gone, dropping connection");
                    break;
                }
            }
            Err(err) => {
                // Malformed traffic from a registered peer is a probe.
                warn!(error = %err, "malformed message frame");
                let _ = conn.close(CloseCode::ProtocolError, &format!("malformed message: {err}"));
                break;
            }
        }
    }

    info!(address = %session.address, "peer disconnected");
    state.registry.unregister(&conn);
    let _ = conn.close(CloseCode::NormalClosure, "connection closed");
    let _ = pump.await;
    writer.abort();
}
