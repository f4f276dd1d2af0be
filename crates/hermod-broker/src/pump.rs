//! The outbound delivery pump.
//!
//! One pump task per live connection, bound to that session's outbound
//! queue. The pump guarantees strictly ordered, independently-paced
//! delivery without ever blocking the dispatch engine: routing only pushes
//! onto the queue, the pump drains it into the connection's frame channel.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::PeerConnection;
use crate::session::PeerSession;

/// Spawns and names delivery pump tasks.
pub struct DeliveryPump;

impl DeliveryPump {
    /// Spawn the pump for a connection.
    ///
    /// The pump exits when the connection's token is cancelled (at most one
    /// pending `recv` later) or the session's queue is torn down. A frame
    /// that fails to serialize or transmit is logged and skipped — one bad
    /// frame must not stop subsequent delivery. On exit the outbound
    /// receiver is parked back on the session so queued messages survive.
    pub fn spawn(session: Arc<PeerSession>, conn: Arc<PeerConnection>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let Some(mut rx) = session.take_outbound_rx() else {
                warn!(address = %session.address, "outbound queue already pumped, not starting");
                return;
            };
            let token = conn.pump_token();
            debug!(address = %session.address, connection_id = %conn.id, "delivery pump started");

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    message = rx.recv() => match message {
                        Some(message) => match message.to_frame() {
                            Ok(text) => {
                                if !conn.send_text(text) {
                                    warn!(
                                        address = %session.address,
                                        "failed to hand frame to transport"
                                    );
                                }
                            }
                            Err(error) => {
                                warn!(address = %session.address, %error, "unserializable outbound message");
                            }
                        },
                        None => break,
                    }
                }
            }

            session.park_outbound_rx(rx);
            debug!(address = %session.address, connection_id = %conn.id, "delivery pump stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Frame;
    use hermod_core::{CloseCode, PeerMessage, PeerType, Principal};
    use serde_json::Value;
    use std::time::Duration;

    fn make_pair() -> (
        Arc<PeerSession>,
        Arc<PeerConnection>,
        tokio::sync::mpsc::UnboundedReceiver<Frame>,
    ) {
        let session = PeerSession::new(
            "destination_peer",
            Principal::new("user_1", "alice"),
            "127.0.0.1",
            PeerType::Worker,
        );
        let (conn, frame_rx) = PeerConnection::new(session.id.clone(), "127.0.0.1");
        (session, conn, frame_rx)
    }

    fn message_with_id(id: u64) -> PeerMessage {
        let mut msg = PeerMessage::new("ref://hermod.message");
        msg.message_id = Some(id);
        msg
    }

    #[tokio::test]
    async fn pump_delivers_in_fifo_order() {
        let (session, conn, mut frame_rx) = make_pair();
        let pump = DeliveryPump::spawn(session.clone(), conn);

        for i in 0..5_u64 {
            assert!(session.queue_message(message_with_id(i)));
        }
        for i in 0..5_u64 {
            let frame = tokio::time::timeout(Duration::from_millis(100), frame_rx.recv())
                .await
                .expect("frame within the delivery window")
                .unwrap();
            match frame {
                Frame::Text(text) => {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    assert_eq!(value["messageId"], i);
                }
                Frame::Close { .. } => panic!("unexpected close"),
            }
        }
        pump.abort();
    }

    #[tokio::test]
    async fn close_stops_the_pump() {
        let (session, conn, _frame_rx) = make_pair();
        let pump = DeliveryPump::spawn(session.clone(), conn.clone());

        let _ = conn.close(CloseCode::NormalClosure, "done");
        tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .expect("pump exits after close")
            .unwrap();

        // Receiver is parked back for a future pump.
        assert!(session.take_outbound_rx().is_some());
    }

    #[tokio::test]
    async fn undelivered_messages_survive_the_pump() {
        let (session, conn, _frame_rx) = make_pair();
        // Cancel before the pump ever runs a delivery.
        let _ = conn.close(CloseCode::GoingAway, "going away");
        let pump = DeliveryPump::spawn(session.clone(), conn);
        pump.await.unwrap();

        assert!(session.queue_message(message_with_id(9)));
        let mut rx = session.take_outbound_rx().unwrap();
        assert_eq!(rx.try_recv().unwrap().message_id, Some(9));
    }

    #[tokio::test]
    async fn second_pump_on_same_session_refuses() {
        let (session, conn, _frame_rx) = make_pair();
        let first = DeliveryPump::spawn(session.clone(), conn.clone());
        // Give the first pump time to claim the receiver.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = DeliveryPump::spawn(session.clone(), conn.clone());
        second.await.unwrap();

        // The first pump still owns the queue and keeps delivering.
        let _ = conn.close(CloseCode::NormalClosure, "done");
        first.await.unwrap();
    }
}
