//! Async request/response channel over the storage worker boundary.
//!
//! # Responsibility
//! - Present storage operations as ordinary async calls.
//! - Match each result to its call by correlation id, so several calls may
//!   be in flight and results may arrive in any order.
//! - Bound every call with a timeout.
//!
//! # Invariants
//! - A call resolves with its own result or an error; never another call's.
//! - Abandoned calls (timed out or dropped) release their pending slot; a
//!   late result for them is logged and discarded.
//! - A fault rejects only the calls it concerns; the channel stays usable.
//! - Dropping the channel never blocks the caller on the worker thread.

use crate::config::{ConfigError, StoreConfig};
use crate::model::record::{Record, RecordId};
use crate::protocol::{
    decode_data, peek_correlation_id, Command, CommandKind, CorrelationId, ErrorDescriptor,
    ProtocolError, ResultMessage,
};
use crate::store::record_store::StoreConnector;
use crate::worker::{WorkerEvent, WorkerFault, WorkerHandle};
use log::{debug, error, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Failure of one channel call.
#[derive(Debug)]
pub enum ChannelError {
    /// The executor answered with an error result.
    Command(ErrorDescriptor),
    /// The worker reported a fault outside result delivery.
    Fault(WorkerFault),
    /// No result arrived in time.
    Timeout {
        id: CorrelationId,
        kind: CommandKind,
        after: Duration,
    },
    /// The worker is gone; no result will ever arrive.
    Disconnected,
    /// A message could not be encoded or a result could not be decoded.
    Protocol(ProtocolError),
    /// The channel configuration was rejected.
    Config(ConfigError),
    /// The worker thread could not be started.
    Spawn(std::io::Error),
}

impl ChannelError {
    /// Error code reported by the executor, if this is a command error.
    pub fn command_code(&self) -> Option<&str> {
        match self {
            Self::Command(descriptor) => Some(descriptor.code.as_str()),
            _ => None,
        }
    }
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(descriptor) => write!(f, "command failed: {descriptor}"),
            Self::Fault(fault) => write!(f, "{fault}"),
            Self::Timeout { id, kind, after } => write!(
                f,
                "`{kind}` call {id} timed out after {} ms",
                after.as_millis()
            ),
            Self::Disconnected => write!(f, "storage worker disconnected"),
            Self::Protocol(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Spawn(err) => write!(f, "failed to start storage worker: {err}"),
        }
    }
}

impl Error for ChannelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fault(fault) => Some(fault),
            Self::Protocol(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Spawn(err) => Some(err),
            Self::Command(_) | Self::Timeout { .. } | Self::Disconnected => None,
        }
    }
}

impl From<ProtocolError> for ChannelError {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

impl From<ConfigError> for ChannelError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

type CallOutcome = Result<Value, ChannelError>;

struct PendingCall {
    kind: CommandKind,
    reply: oneshot::Sender<CallOutcome>,
}

type PendingCalls = Arc<Mutex<HashMap<CorrelationId, PendingCall>>>;

/// Client side of the storage worker boundary.
pub struct CommandChannel {
    worker: WorkerHandle,
    pending: PendingCalls,
    next_id: AtomicU64,
    call_timeout: Duration,
}

impl CommandChannel {
    /// Starts a worker for the store described by `config`.
    ///
    /// The store itself is opened by the first `init` call.
    pub fn open(config: StoreConfig) -> Result<Self, ChannelError> {
        config.validate()?;
        let call_timeout = config.call_timeout();
        Self::open_with(config, call_timeout)
    }

    /// Starts a worker serving stores produced by `connector`.
    pub fn open_with<C>(connector: C, call_timeout: Duration) -> Result<Self, ChannelError>
    where
        C: StoreConnector + Send + 'static,
    {
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let routed = Arc::clone(&pending);
        let worker = WorkerHandle::spawn(connector, move |event| route_event(&routed, event))
            .map_err(ChannelError::Spawn)?;
        Ok(Self {
            worker,
            pending,
            next_id: AtomicU64::new(1),
            call_timeout,
        })
    }

    /// Sends one command and waits for its result data.
    pub async fn call(&self, command: Command) -> CallOutcome {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kind = command.kind();
        let message = command.into_message(id)?;
        let text = serde_json::to_string(&message).map_err(ProtocolError::Encode)?;

        let (reply, receiver) = oneshot::channel();
        lock(&self.pending).insert(id, PendingCall { kind, reply });
        let _slot = PendingSlot {
            pending: &self.pending,
            id,
        };

        if self.worker.post_message(text).is_err() {
            return Err(ChannelError::Disconnected);
        }
        debug!("event=channel_call module=channel status=start id={id} kind={kind}");

        match tokio::time::timeout(self.call_timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ChannelError::Disconnected),
            Err(_) => {
                warn!(
                    "event=channel_call module=channel status=error id={id} kind={kind} error_code=timeout timeout_ms={}",
                    self.call_timeout.as_millis()
                );
                Err(ChannelError::Timeout {
                    id,
                    kind,
                    after: self.call_timeout,
                })
            }
        }
    }

    /// Number of calls still waiting for a result.
    pub fn pending_calls(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Stops the worker and rejects every pending call. Idempotent.
    ///
    /// Blocks until the worker has finished its current command and released
    /// the store; dropping the channel instead detaches the worker.
    pub fn close(&mut self) {
        self.worker.terminate();
        lock(&self.pending).clear();
    }

    pub fn is_open(&self) -> bool {
        self.worker.is_running()
    }

    /// Connects the worker's store.
    pub async fn init(&self) -> Result<(), ChannelError> {
        self.call(Command::Init).await?;
        Ok(())
    }

    /// Creates a record and returns it with its store-assigned id.
    pub async fn create(&self, record: Record) -> Result<Record, ChannelError> {
        let data = self.call(Command::Create(record)).await?;
        Ok(decode_data(data, "a record")?)
    }

    pub async fn read(&self, id: RecordId) -> Result<Option<Record>, ChannelError> {
        let data = self.call(Command::Read(id)).await?;
        Ok(decode_data(data, "a record or null")?)
    }

    /// Replaces a stored record and returns the stored result.
    pub async fn update(&self, record: Record) -> Result<Record, ChannelError> {
        let data = self.call(Command::Update(record)).await?;
        Ok(decode_data(data, "a record")?)
    }

    /// Deletes a record and returns the echoed id.
    pub async fn delete(&self, id: RecordId) -> Result<RecordId, ChannelError> {
        let data = self.call(Command::Delete(id)).await?;
        Ok(decode_data(data, "a record id")?)
    }

    pub async fn list_all(&self) -> Result<Vec<Record>, ChannelError> {
        let data = self.call(Command::ListAll).await?;
        Ok(decode_data(data, "a record list")?)
    }

    /// Records whose title contains `title_substring`; `""` matches all.
    pub async fn filter(
        &self,
        title_substring: impl Into<String>,
    ) -> Result<Vec<Record>, ChannelError> {
        let data = self.call(Command::Filter(title_substring.into())).await?;
        Ok(decode_data(data, "a record list")?)
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.worker.detach();
        lock(&self.pending).clear();
    }
}

/// Releases a pending slot when its call finishes or is dropped.
struct PendingSlot<'a> {
    pending: &'a PendingCalls,
    id: CorrelationId,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn lock(pending: &PendingCalls) -> MutexGuard<'_, HashMap<CorrelationId, PendingCall>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn route_event(pending: &PendingCalls, event: WorkerEvent) {
    match event {
        WorkerEvent::Message(text) => match serde_json::from_str::<ResultMessage>(&text) {
            Ok(result) => {
                let id = result.id;
                resolve(pending, id, result.into_outcome().map_err(ChannelError::Command));
            }
            Err(err) => {
                error!(
                    "event=channel_route module=channel status=error error_code=undecodable_result error={err}"
                );
                if let Some(id) = peek_correlation_id(&text) {
                    resolve(pending, id, Err(ProtocolError::Malformed(err).into()));
                }
            }
        },
        WorkerEvent::Error(fault) => {
            error!(
                "event=channel_route module=channel status=error error_code=worker_fault error={fault}"
            );
            match fault.correlation_id {
                Some(id) => resolve(pending, id, Err(ChannelError::Fault(fault))),
                None => {
                    let calls: Vec<PendingCall> =
                        lock(pending).drain().map(|(_, call)| call).collect();
                    for call in calls {
                        let _ = call.reply.send(Err(ChannelError::Fault(fault.clone())));
                    }
                }
            }
        }
    }
}

fn resolve(pending: &PendingCalls, id: CorrelationId, outcome: CallOutcome) {
    let Some(call) = lock(pending).remove(&id) else {
        warn!("event=channel_route module=channel status=dropped id={id} reason=no_pending_call");
        return;
    };
    if call.reply.send(outcome).is_err() {
        debug!(
            "event=channel_route module=channel status=dropped id={id} kind={} reason=caller_gone",
            call.kind
        );
    }
}
