//! The dispatch engine.
//!
//! A [`Monitor`] serializes all inbound message handling onto exactly one
//! consumer task, no matter how many producers push onto the shared queue.
//! Handler failures are isolated per item; losing the queue itself is fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::errors::{HandlerError, MonitorError};
use crate::queue::{inbound_queue, InboundReceiver, InboundSender, QueueItem};

/// Reacts to each item the monitor pulls off the shared queue.
///
/// `handle` must not block the consumer: anything slow goes through async
/// I/O so one item cannot stall the loop indefinitely.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    /// Handle one queue item. Errors are logged at the monitor boundary and
    /// never stop the loop.
    async fn handle(&self, item: QueueItem) -> Result<(), HandlerError>;

    /// Called by the monitor when shutting down, attributed to the stopping
    /// user.
    async fn shut_down(&self, user_id: &str);
}

struct MonitorState {
    receiver: Option<InboundReceiver>,
    task: Option<JoinHandle<()>>,
}

/// The single-consumer dispatch engine over the shared inbound queue.
///
/// Lifecycle is one-way: once terminated, a monitor cannot be restarted —
/// construct a new one.
pub struct Monitor {
    handler: Arc<dyn QueueHandler>,
    state: Mutex<MonitorState>,
    terminated: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Monitor {
    /// Create a monitor over a fresh inbound queue, returning the producer
    /// half for the connection-accept path and internal senders.
    #[must_use]
    pub fn new(handler: Arc<dyn QueueHandler>) -> (Self, InboundSender) {
        let (tx, rx) = inbound_queue();
        let monitor = Self {
            handler,
            state: Mutex::new(MonitorState {
                receiver: Some(rx),
                task: None,
            }),
            terminated: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        };
        (monitor, tx)
    }

    /// Start the consumer loop. Fails if it is already running or the
    /// monitor has terminated.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        if self.terminated.load(Ordering::SeqCst) {
            return Err(MonitorError::Terminated);
        }
        if state.task.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }
        let Some(mut receiver) = state.receiver.take() else {
            return Err(MonitorError::Terminated);
        };

        let handler = self.handler.clone();
        let terminated = self.terminated.clone();
        let cancel = self.cancel.clone();
        state.task = Some(tokio::spawn(async move {
            debug!("dispatch loop running");
            loop {
                tokio::select! {
                    // Check termination before draining further items.
                    biased;
                    () = cancel.cancelled() => break,
                    item = receiver.recv() => match item {
                        Some(item) => {
                            if let Err(err) = handler.handle(item).await {
                                error!(error = %err, "error handling queue item");
                            }
                        }
                        None => {
                            // All producers gone: the broker cannot continue
                            // without its dispatch primitive.
                            error!("inbound queue closed, terminating dispatch loop");
                            break;
                        }
                    }
                }
            }
            terminated.store(true, Ordering::SeqCst);
            debug!("dispatch loop stopped");
        }));
        Ok(())
    }

    /// Whether the consumer loop has terminated (or was stopped).
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Stop the monitor and tell the handler to shut down.
    ///
    /// By default the loop is terminated first, so no further items are
    /// dequeued, then `shut_down` runs. With `reverse_order` the handler is
    /// shut down while the loop still runs — for handlers that need the
    /// loop to flush final messages during their own shutdown.
    pub async fn stop(&self, user_id: &str, reverse_order: bool) -> Result<(), MonitorError> {
        {
            let state = self.state.lock();
            if state.task.is_none() {
                return Err(MonitorError::NotRunning);
            }
        }

        if !reverse_order {
            debug!("told to stop, ceasing dispatch");
            self.terminate();
        }

        debug!("shutting down handler");
        self.handler.shut_down(user_id).await;
        debug!("handler shut down");

        if reverse_order {
            debug!("told to stop, ceasing dispatch");
            self.terminate();
        }

        let task = self.state.lock().task.take();
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(())
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }
}
