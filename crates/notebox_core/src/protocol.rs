//! Command/result wire protocol between callers and the storage worker.
//!
//! # Responsibility
//! - Define the typed `Command` set and its JSON envelope.
//! - Define the result envelope and its error descriptor.
//!
//! # Invariants
//! - Every command and result message carries the caller's correlation id.
//! - A result carries either `data` or an `error`, never both meaningfully:
//!   error results always have `data: null`.
//!
//! Outbound: `{"id": 1, "kind": "create", "payload": {...}}`.
//! Inbound: `{"id": 1, "data": ...}` or `{"id": 1, "data": null, "error": {...}}`.

use crate::model::record::{Record, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Channel-assigned id pairing a result with its command.
pub type CorrelationId = u64;

/// Recognized command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandKind {
    Init,
    Create,
    Read,
    Update,
    Delete,
    ListAll,
    Filter,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ListAll => "listAll",
            Self::Filter => "filter",
        }
    }
}

impl Display for CommandKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested storage operation with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init,
    Create(Record),
    Read(RecordId),
    Update(Record),
    Delete(RecordId),
    ListAll,
    Filter(String),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Init => CommandKind::Init,
            Self::Create(_) => CommandKind::Create,
            Self::Read(_) => CommandKind::Read,
            Self::Update(_) => CommandKind::Update,
            Self::Delete(_) => CommandKind::Delete,
            Self::ListAll => CommandKind::ListAll,
            Self::Filter(_) => CommandKind::Filter,
        }
    }

    /// Builds the wire envelope for this command.
    pub fn into_message(self, id: CorrelationId) -> Result<CommandMessage, ProtocolError> {
        let kind = self.kind();
        let payload = match self {
            Self::Init | Self::ListAll => Value::Null,
            Self::Create(record) | Self::Update(record) => {
                serde_json::to_value(&record).map_err(ProtocolError::Encode)?
            }
            Self::Read(record_id) | Self::Delete(record_id) => Value::from(record_id),
            Self::Filter(text) => Value::String(text),
        };
        Ok(CommandMessage { id, kind, payload })
    }

    /// Decodes the typed command carried by an envelope.
    pub fn from_message(message: CommandMessage) -> Result<Self, ProtocolError> {
        let CommandMessage { kind, payload, .. } = message;
        let command = match kind {
            CommandKind::Init => Self::Init,
            CommandKind::ListAll => Self::ListAll,
            CommandKind::Create => Self::Create(decode_payload(kind, payload)?),
            CommandKind::Update => Self::Update(decode_payload(kind, payload)?),
            CommandKind::Read => Self::Read(decode_payload(kind, payload)?),
            CommandKind::Delete => Self::Delete(decode_payload(kind, payload)?),
            CommandKind::Filter => Self::Filter(decode_payload(kind, payload)?),
        };
        Ok(command)
    }
}

/// Outbound wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub id: CorrelationId,
    pub kind: CommandKind,
    #[serde(default)]
    pub payload: Value,
}

/// Machine-readable failure carried inside a result envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Stable snake_case identifier.
    pub code: String,
    /// Human-readable detail; may change between releases.
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl Display for ErrorDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Inbound wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub id: CorrelationId,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl ResultMessage {
    pub fn success(id: CorrelationId, data: Value) -> Self {
        Self {
            id,
            data,
            error: None,
        }
    }

    pub fn failure(id: CorrelationId, error: ErrorDescriptor) -> Self {
        Self {
            id,
            data: Value::Null,
            error: Some(error),
        }
    }

    /// Splits the envelope into the caller-facing outcome.
    pub fn into_outcome(self) -> Result<Value, ErrorDescriptor> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

/// Malformed message or payload.
#[derive(Debug)]
pub enum ProtocolError {
    InvalidPayload {
        kind: CommandKind,
        source: serde_json::Error,
    },
    Malformed(serde_json::Error),
    /// A message could not be serialized.
    Encode(serde_json::Error),
    MissingCorrelationId,
    UnexpectedData {
        expected: &'static str,
        source: serde_json::Error,
    },
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPayload { kind, source } => {
                write!(f, "invalid `{kind}` payload: {source}")
            }
            Self::Malformed(err) => write!(f, "malformed message: {err}"),
            Self::Encode(err) => write!(f, "failed to encode message: {err}"),
            Self::MissingCorrelationId => write!(f, "message carries no correlation id"),
            Self::UnexpectedData { expected, source } => {
                write!(f, "result data is not {expected}: {source}")
            }
        }
    }
}

impl Error for ProtocolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidPayload { source, .. } | Self::UnexpectedData { source, .. } => {
                Some(source)
            }
            Self::Malformed(err) | Self::Encode(err) => Some(err),
            Self::MissingCorrelationId => None,
        }
    }
}

/// Best-effort correlation id lookup on text that failed to decode.
pub fn peek_correlation_id(text: &str) -> Option<CorrelationId> {
    serde_json::from_str::<Value>(text)
        .ok()?
        .get("id")?
        .as_u64()
}

/// Decodes result `data` into the type a typed call expects.
pub fn decode_data<T: serde::de::DeserializeOwned>(
    data: Value,
    expected: &'static str,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::UnexpectedData { expected, source })
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    kind: CommandKind,
    payload: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}
