//! Core persistence and command layer for notebox.
//!
//! Records live in a SQLite-backed store owned by a command executor on an
//! isolated worker thread; callers reach it through an async command channel.

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod executor;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod store;
pub mod worker;

pub use channel::{ChannelError, CommandChannel};
pub use config::{ConfigError, StoreConfig};
pub use coordinator::{EditorDisplay, EditorSubmit, ListDisplay, NotesController};
pub use executor::{CommandExecutor, ExecutorError};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use model::record::{Record, RecordId};
pub use protocol::{
    Command, CommandKind, CommandMessage, CorrelationId, ErrorDescriptor, ProtocolError,
    ResultMessage,
};
pub use store::record_store::{
    RecordStore, SqliteRecordStore, StoreConnector, StoreError, StoreResult, WriteOp,
};
pub use worker::{WorkerEvent, WorkerFault, WorkerHandle};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
