//! Isolated storage worker and its message boundary.
//!
//! # Responsibility
//! - Run the command executor on a dedicated thread that shares no memory
//!   with callers.
//! - Carry messages across the boundary as serialized JSON text only.
//! - Report outcomes through a single event handler slot: a message or an
//!   error.
//!
//! # Invariants
//! - Inbound messages are served one at a time, in arrival order.
//! - A panic while serving a message is reported as a fault event and the
//!   worker keeps serving later messages.
//! - Terminating the worker shuts the executor down, releasing the store.
//! - Dropping the handle never blocks on the worker thread.

use crate::executor::CommandExecutor;
use crate::logging::panic_payload_summary;
use crate::protocol::{peek_correlation_id, CorrelationId};
use crate::store::record_store::StoreConnector;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

const WORKER_THREAD_NAME: &str = "notebox-store-worker";

/// Fault reported outside normal result delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFault {
    /// Set when the fault could be attributed to one command.
    pub correlation_id: Option<CorrelationId>,
    pub message: String,
}

impl Display for WorkerFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.correlation_id {
            Some(id) => write!(f, "worker fault on command {id}: {}", self.message),
            None => write!(f, "worker fault: {}", self.message),
        }
    }
}

impl Error for WorkerFault {}

/// Event posted by the worker back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Serialized result envelope.
    Message(String),
    /// Execution fault outside result delivery.
    Error(WorkerFault),
}

enum WorkerInput {
    Message(String),
    Terminate,
}

/// Posting a message to a worker that is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerGone;

impl Display for WorkerGone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "storage worker is not running")
    }
}

impl Error for WorkerGone {}

/// Owner-side handle to a running storage worker.
pub struct WorkerHandle {
    inbox: mpsc::Sender<WorkerInput>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Starts a worker serving commands against stores opened by `connector`.
    ///
    /// `on_event` is the single outbound handler slot; it runs on the worker
    /// thread for every result message and fault.
    pub fn spawn<C, F>(connector: C, on_event: F) -> std::io::Result<Self>
    where
        C: StoreConnector + Send + 'static,
        F: Fn(WorkerEvent) + Send + 'static,
    {
        let (inbox, receiver) = mpsc::channel::<WorkerInput>();
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(CommandExecutor::new(connector), receiver, on_event))?;
        info!("event=worker_spawn module=worker status=ok");
        Ok(Self {
            inbox,
            thread: Some(thread),
        })
    }

    /// Fire-and-forget post of one serialized command message.
    pub fn post_message(&self, text: String) -> Result<(), WorkerGone> {
        self.inbox
            .send(WorkerInput::Message(text))
            .map_err(|_| WorkerGone)
    }

    /// Stops the worker after the messages already queued, then joins it.
    ///
    /// Idempotent.
    pub fn terminate(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.inbox.send(WorkerInput::Terminate);
        if thread.join().is_err() {
            error!("event=worker_terminate module=worker status=error error_code=join_failed");
            return;
        }
        info!("event=worker_terminate module=worker status=ok");
    }

    /// Asks the worker to stop without waiting for it.
    ///
    /// The worker finishes its queued messages and disconnects the store on
    /// its own thread. Idempotent.
    pub fn detach(&mut self) {
        if self.thread.take().is_none() {
            return;
        }
        let _ = self.inbox.send(WorkerInput::Terminate);
        info!("event=worker_terminate module=worker status=detached");
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

fn run_worker<C, F>(
    mut executor: CommandExecutor<C>,
    receiver: mpsc::Receiver<WorkerInput>,
    on_event: F,
) where
    C: StoreConnector,
    F: Fn(WorkerEvent),
{
    while let Ok(input) = receiver.recv() {
        let text = match input {
            WorkerInput::Message(text) => text,
            WorkerInput::Terminate => break,
        };

        let served = panic::catch_unwind(AssertUnwindSafe(|| executor.handle_text(&text)));
        let event = match served {
            Ok(Ok(result)) => match serde_json::to_string(&result) {
                Ok(encoded) => WorkerEvent::Message(encoded),
                Err(err) => WorkerEvent::Error(WorkerFault {
                    correlation_id: Some(result.id),
                    message: format!("failed to encode result: {err}"),
                }),
            },
            Ok(Err(err)) => WorkerEvent::Error(WorkerFault {
                correlation_id: None,
                message: err.to_string(),
            }),
            Err(payload) => {
                let message = panic_payload_summary(payload.as_ref());
                error!(
                    "event=worker_fault module=worker status=error error_code=executor_panic message={message}"
                );
                WorkerEvent::Error(WorkerFault {
                    correlation_id: peek_correlation_id(&text),
                    message,
                })
            }
        };
        on_event(event);
    }

    executor.shutdown();
}
