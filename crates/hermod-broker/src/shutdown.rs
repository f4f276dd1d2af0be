//! The shutdown / restart protocol.
//!
//! Bringing the broker down is best-effort complete: every step is wrapped
//! so a failure in one (say, the durable shutdown log write) adds to an
//! exit-status accumulator but never prevents the remaining steps from
//! running.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hermod_core::{factory, CloseCode, ProcessId};
use hermod_store::{Collection, DocumentStore};

use crate::handler::BrokerHandler;
use crate::monitor::Monitor;

/// Broker lifecycle state. Transitions are one-way per instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerState {
    /// Serving peers.
    Running,
    /// The shutdown sequence is executing.
    Stopping,
    /// The shutdown sequence has finished.
    Stopped,
}

/// Whether the broker is going down for good or coming right back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownKind {
    /// Full shutdown; clients back off longer before reconnecting.
    Stop,
    /// Restart; clients reconnect shortly.
    Restart,
}

impl ShutdownKind {
    /// The close code peers receive, distinguishing restart from shutdown.
    #[must_use]
    pub const fn close_code(self) -> CloseCode {
        match self {
            Self::Stop => CloseCode::ShuttingDown,
            Self::Restart => CloseCode::Restarting,
        }
    }
}

/// Drives the stop/restart sequence and owns the listener's cancellation.
pub struct ShutdownCoordinator {
    state: Mutex<BrokerState>,
    requested: Mutex<Option<ShutdownKind>>,
    exit_status: Mutex<i32>,
    listener: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState::Running),
            requested: Mutex::new(None),
            exit_status: Mutex::new(0),
            listener: CancellationToken::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BrokerState {
        *self.state.lock()
    }

    /// Whether a shutdown has started.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state() != BrokerState::Running
    }

    /// The kind of shutdown that was requested, once one has been.
    #[must_use]
    pub fn requested_kind(&self) -> Option<ShutdownKind> {
        *self.requested.lock()
    }

    /// The exit-status accumulator from the completed sequence.
    #[must_use]
    pub fn exit_status(&self) -> i32 {
        *self.exit_status.lock()
    }

    /// Token the network listener waits on for graceful teardown.
    #[must_use]
    pub fn listener_token(&self) -> CancellationToken {
        self.listener.clone()
    }

    /// Run the shutdown sequence. Returns the exit-status accumulator:
    /// 0 on a clean run, +1 if the dispatch engine failed to stop, +2 if
    /// the durable shutdown log write failed. Only the first call runs the
    /// sequence; later calls are no-ops returning 0.
    ///
    /// Sequence: select the peers' close code, stop the monitor (which has
    /// the handler close every registered peer), record the shutdown-reason
    /// log document, and cancel the listener.
    pub async fn execute(
        &self,
        monitor: &Monitor,
        handler: &BrokerHandler,
        store: &DocumentStore,
        process_id: &ProcessId,
        kind: ShutdownKind,
        reason: &str,
        user_id: &str,
    ) -> i32 {
        {
            let mut state = self.state.lock();
            if *state != BrokerState::Running {
                warn!("shutdown already in progress, ignoring");
                return 0;
            }
            *state = BrokerState::Stopping;
            *self.requested.lock() = Some(kind);
        }

        match kind {
            ShutdownKind::Restart => info!(reason, "broker told to restart, shutting down orderly"),
            ShutdownKind::Stop => info!(reason, "broker terminated, shutting down orderly"),
        }

        let mut exit_status = 0;

        handler.set_shutdown_code(kind.close_code());
        if let Err(err) = monitor.stop(user_id, false).await {
            error!(error = %err, "failed to stop the queue monitor");
            exit_status += 1;
        }

        let state_log = factory::process_state_log_message(
            user_id,
            "killed",
            process_id,
            &format!("Broker was terminated, reason: \"{reason}\", shutting down gracefully"),
        );
        if let Err(err) = store.persist(Collection::Log, &state_log.to_document(), None) {
            error!(error = %err, "failed to write shutdown log document");
            exit_status += 2;
        }

        info!("shutting down network listener");
        self.listener.cancel();

        *self.state.lock() = BrokerState::Stopped;
        *self.exit_status.lock() = exit_status;
        info!(exit_status, "shutdown sequence complete");
        exit_status
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::PeerConnection;
    use crate::monitor::Monitor;
    use crate::registry::PeerRegistry;
    use crate::session::PeerSession;
    use crate::state_cache::ProcessStateCache;
    use hermod_core::{PeerType, Principal, SchemaRegistry};
    use hermod_store::{connection::ConnectionConfig, migrations, new_in_memory};
    use std::sync::Arc;

    struct Fixture {
        monitor: Monitor,
        handler: Arc<BrokerHandler>,
        store: Arc<DocumentStore>,
        registry: Arc<PeerRegistry>,
        coordinator: ShutdownCoordinator,
        process_id: ProcessId,
    }

    fn make_fixture() -> Fixture {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        migrations::run_migrations(&pool.get().unwrap()).unwrap();
        let store = Arc::new(DocumentStore::new(pool));
        let registry = Arc::new(PeerRegistry::new());
        let handler = Arc::new(BrokerHandler::new(
            ProcessId::from("broker_proc"),
            "broker",
            registry.clone(),
            Arc::new(SchemaRegistry::builtin()),
            store.clone(),
            Arc::new(ProcessStateCache::new()),
        ));
        let (monitor, _tx) = Monitor::new(handler.clone());
        Fixture {
            monitor,
            handler,
            store,
            registry,
            coordinator: ShutdownCoordinator::new(),
            process_id: ProcessId::from("broker_proc"),
        }
    }

    fn register_peer(fixture: &Fixture, address: &str) -> Arc<PeerConnection> {
        let session = PeerSession::new(
            address,
            Principal::new("user_1", "alice"),
            "127.0.0.1",
            PeerType::Worker,
        );
        fixture.registry.create_session(session.clone());
        let (conn, _rx) = PeerConnection::new(session.id.clone(), "127.0.0.1");
        let _ = fixture.registry.register(&conn).unwrap();
        conn
    }

    #[tokio::test]
    async fn clean_shutdown_closes_peers_and_logs() {
        let fixture = make_fixture();
        fixture.monitor.start().unwrap();
        let a = register_peer(&fixture, "peer_a");
        let b = register_peer(&fixture, "peer_b");

        let status = fixture
            .coordinator
            .execute(
                &fixture.monitor,
                &fixture.handler,
                &fixture.store,
                &fixture.process_id,
                ShutdownKind::Stop,
                "maintenance window",
                "user_1",
            )
            .await;

        assert_eq!(status, 0);
        assert_eq!(fixture.coordinator.state(), BrokerState::Stopped);
        assert!(fixture.monitor.is_terminated());
        assert_eq!(a.close_code(), Some(CloseCode::ShuttingDown));
        assert_eq!(b.close_code(), Some(CloseCode::ShuttingDown));
        assert!(fixture.coordinator.listener_token().is_cancelled());

        let logs = fixture.store.logs_for_process("broker_proc").unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["state"], "killed");
        assert!(logs[0]["reason"]
            .as_str()
            .unwrap()
            .contains("maintenance window"));
    }

    #[tokio::test]
    async fn restart_uses_the_restart_close_code() {
        let fixture = make_fixture();
        fixture.monitor.start().unwrap();
        let conn = register_peer(&fixture, "peer_a");

        let _ = fixture
            .coordinator
            .execute(
                &fixture.monitor,
                &fixture.handler,
                &fixture.store,
                &fixture.process_id,
                ShutdownKind::Restart,
                "upgrade",
                "user_1",
            )
            .await;

        assert_eq!(conn.close_code(), Some(CloseCode::Restarting));
        assert_eq!(
            fixture.coordinator.requested_kind(),
            Some(ShutdownKind::Restart)
        );
    }

    #[tokio::test]
    async fn monitor_failure_accumulates_but_does_not_abort() {
        let fixture = make_fixture();
        // Monitor never started: stop fails, yet the rest of the sequence
        // still runs.
        let conn = register_peer(&fixture, "peer_a");

        let status = fixture
            .coordinator
            .execute(
                &fixture.monitor,
                &fixture.handler,
                &fixture.store,
                &fixture.process_id,
                ShutdownKind::Stop,
                "boom",
                "user_1",
            )
            .await;

        assert_eq!(status, 1);
        // Handler shutdown is driven by the monitor; with the monitor dead
        // the peers stay open, but the log write and listener teardown ran.
        assert!(conn.close_code().is_none());
        assert!(fixture.coordinator.listener_token().is_cancelled());
        assert_eq!(fixture.store.count_logs().unwrap(), 1);
    }

    #[tokio::test]
    async fn second_shutdown_is_a_no_op() {
        let fixture = make_fixture();
        fixture.monitor.start().unwrap();

        let first = fixture
            .coordinator
            .execute(
                &fixture.monitor,
                &fixture.handler,
                &fixture.store,
                &fixture.process_id,
                ShutdownKind::Stop,
                "first",
                "user_1",
            )
            .await;
        let second = fixture
            .coordinator
            .execute(
                &fixture.monitor,
                &fixture.handler,
                &fixture.store,
                &fixture.process_id,
                ShutdownKind::Stop,
                "second",
                "user_1",
            )
            .await;

        assert_eq!(first, 0);
        assert_eq!(second, 0);
        assert_eq!(fixture.store.count_logs().unwrap(), 1);
    }

    #[test]
    fn close_codes_distinguish_restart_from_stop() {
        assert_eq!(ShutdownKind::Stop.close_code(), CloseCode::ShuttingDown);
        assert_eq!(ShutdownKind::Restart.close_code(), CloseCode::Restarting);
    }
}
