//! Command executor living inside the storage worker.
//!
//! # Responsibility
//! - Own the single record store instance and its init/teardown lifecycle.
//! - Translate typed commands into store calls and results back.
//!
//! # Invariants
//! - The store is created by `init` and reused until `shutdown`.
//! - `create`/`update` reply with the canonical record read back after the
//!   write, never with a bare success flag.
//! - Store failures become error results; the executor stays usable.

use crate::config::StoreConfig;
use crate::model::record::Record;
use crate::protocol::{
    Command, CommandKind, CommandMessage, ErrorDescriptor, ProtocolError, ResultMessage,
};
use crate::store::record_store::{RecordStore, StoreConnector, StoreError};
use log::{debug, info, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure while serving one command.
#[derive(Debug)]
pub enum ExecutorError {
    /// A non-`init` command arrived before the store was connected.
    NotInitialized(CommandKind),
    /// The record store rejected the operation.
    Store(StoreError),
    /// The command envelope or payload could not be decoded.
    Protocol(ProtocolError),
    /// The envelope named a kind this executor does not serve.
    UnknownCommand(String),
    /// A write succeeded but the read-back did not find the record.
    InconsistentState(&'static str),
    /// A reply value could not be encoded.
    Encode(serde_json::Error),
}

impl ExecutorError {
    /// Stable code carried by the error descriptor.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized(_) => "not_initialized",
            Self::Store(StoreError::Connection(_) | StoreError::CreateDirectory { .. }) => {
                "connection_error"
            }
            Self::Store(StoreError::Config(_)) => "invalid_config",
            Self::Store(StoreError::Write { .. }) => "write_error",
            Self::Store(StoreError::Read(_)) => "read_error",
            Self::Store(StoreError::MissingId) => "missing_id",
            Self::Store(StoreError::Disconnected) => "disconnected",
            Self::Protocol(ProtocolError::InvalidPayload { .. }) => "invalid_payload",
            Self::Protocol(_) => "malformed_message",
            Self::UnknownCommand(_) => "unknown_command",
            Self::InconsistentState(_) => "inconsistent_state",
            Self::Encode(_) => "encode_error",
        }
    }

    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor::new(self.code(), self.to_string())
    }
}

impl Display for ExecutorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInitialized(kind) => {
                write!(f, "`{kind}` received before the store was initialized")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::Protocol(err) => write!(f, "{err}"),
            Self::UnknownCommand(kind) => write!(f, "unknown command kind `{kind}`"),
            Self::InconsistentState(details) => write!(f, "inconsistent store state: {details}"),
            Self::Encode(err) => write!(f, "failed to encode reply: {err}"),
        }
    }
}

impl Error for ExecutorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Protocol(err) => Some(err),
            Self::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ExecutorError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ProtocolError> for ExecutorError {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

impl From<serde_json::Error> for ExecutorError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

/// Serves commands against one lazily connected record store.
pub struct CommandExecutor<C: StoreConnector = StoreConfig> {
    connector: C,
    store: Option<C::Store>,
}

impl<C: StoreConnector> CommandExecutor<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            store: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_some()
    }

    /// Decodes one wire message and serves it.
    ///
    /// Returns `Err` only when the text cannot be attributed to any
    /// correlation id; every attributable failure becomes an error result.
    pub fn handle_text(&mut self, text: &str) -> Result<ResultMessage, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        let id = value
            .get("id")
            .and_then(Value::as_u64)
            .ok_or(ProtocolError::MissingCorrelationId)?;

        let unknown_kind = value
            .get("kind")
            .and_then(Value::as_str)
            .filter(|kind| {
                serde_json::from_value::<CommandKind>(Value::String((*kind).to_string())).is_err()
            })
            .map(str::to_string);

        let message = match serde_json::from_value::<CommandMessage>(value) {
            Ok(message) => message,
            Err(err) => {
                let failure = match unknown_kind {
                    Some(kind) => ExecutorError::UnknownCommand(kind),
                    None => ExecutorError::Protocol(ProtocolError::Malformed(err)),
                };
                warn!(
                    "event=command_rejected module=executor status=error id={id} error_code={}",
                    failure.code()
                );
                return Ok(ResultMessage::failure(id, failure.descriptor()));
            }
        };
        Ok(self.handle_message(message))
    }

    /// Serves one decoded envelope, always producing a result envelope.
    pub fn handle_message(&mut self, message: CommandMessage) -> ResultMessage {
        let id = message.id;
        let kind = message.kind;
        let outcome = Command::from_message(message)
            .map_err(ExecutorError::from)
            .and_then(|command| self.execute(command));

        match outcome {
            Ok(data) => {
                debug!("event=command_done module=executor status=ok id={id} kind={kind}");
                ResultMessage::success(id, data)
            }
            Err(err) => {
                warn!(
                    "event=command_done module=executor status=error id={id} kind={kind} error_code={} error={}",
                    err.code(),
                    err
                );
                ResultMessage::failure(id, err.descriptor())
            }
        }
    }

    /// Dispatches one typed command and returns the reply data.
    pub fn execute(&mut self, command: Command) -> Result<Value, ExecutorError> {
        if let Command::Init = command {
            self.init()?;
            return Ok(Value::Bool(true));
        }

        let kind = command.kind();
        let store = self
            .store
            .as_mut()
            .ok_or(ExecutorError::NotInitialized(kind))?;

        match command {
            Command::Init => Ok(Value::Bool(true)),
            Command::Create(record) => {
                let id = store.create(&record)?;
                let created = store.read(id)?.ok_or(ExecutorError::InconsistentState(
                    "created record not found in read-back",
                ))?;
                record_value(&created)
            }
            Command::Read(id) => match store.read(id)? {
                Some(record) => record_value(&record),
                None => Ok(Value::Null),
            },
            Command::Update(record) => {
                let id = store.update(&record)?;
                let updated = store.read(id)?.ok_or(ExecutorError::InconsistentState(
                    "updated record not found in read-back",
                ))?;
                record_value(&updated)
            }
            Command::Delete(id) => {
                store.delete(id)?;
                Ok(Value::from(id))
            }
            Command::ListAll => Ok(serde_json::to_value(store.list_all()?)?),
            Command::Filter(text) => Ok(serde_json::to_value(store.filter(&text)?)?),
        }
    }

    /// Releases the store. Later commands need a fresh `init`.
    pub fn shutdown(&mut self) {
        if let Some(mut store) = self.store.take() {
            store.disconnect();
            info!("event=executor_shutdown module=executor status=ok");
        }
    }

    fn init(&mut self) -> Result<(), ExecutorError> {
        if self.store.is_some() {
            debug!("event=executor_init module=executor status=ok reused=true");
            return Ok(());
        }
        let store = self.connector.connect()?;
        self.store = Some(store);
        info!("event=executor_init module=executor status=ok reused=false");
        Ok(())
    }
}

fn record_value(record: &Record) -> Result<Value, ExecutorError> {
    Ok(serde_json::to_value(record)?)
}
