//! Record store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and title filtering over the `notes` collection.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Every write runs in its own immediate transaction that fully commits or
//!   fully rolls back.
//! - `read` reports absence as `None`; absence is never an error.
//! - `delete` is idempotent.
//! - A disconnected store rejects every operation and never reconnects.

use crate::config::{ConfigError, StoreConfig};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::record::{Record, RecordId};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const RECORD_SELECT_SQL: &str = "SELECT id, title, notes FROM notes";

pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation that performs writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl WriteOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Error raised by record store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Opening or migrating the store failed.
    Connection(DbError),
    /// The store config was rejected before touching the filesystem.
    Config(ConfigError),
    /// The data directory could not be created.
    CreateDirectory {
        dir: PathBuf,
        source: std::io::Error,
    },
    /// The store handle was released by `disconnect`.
    Disconnected,
    /// A write transaction aborted; the connection stays usable.
    Write {
        op: WriteOp,
        source: rusqlite::Error,
    },
    /// A read or filter query failed.
    Read(rusqlite::Error),
    /// `update` needs a record that already carries an id.
    MissingId,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(err) => write!(f, "failed to connect notes store: {err}"),
            Self::Config(err) => write!(f, "invalid notes store config: {err}"),
            Self::CreateDirectory { dir, source } => write!(
                f,
                "failed to create notes data directory `{}`: {source}",
                dir.display()
            ),
            Self::Disconnected => write!(f, "notes store is disconnected"),
            Self::Write { op, source } => write!(f, "{} failed: {source}", op.as_str()),
            Self::Read(err) => write!(f, "read failed: {err}"),
            Self::MissingId => write!(f, "update requires a record id"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connection(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::CreateDirectory { source, .. } => Some(source),
            Self::Write { source, .. } => Some(source),
            Self::Read(err) => Some(err),
            Self::Disconnected | Self::MissingId => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Connection(value)
    }
}

/// Storage contract served by the command executor.
pub trait RecordStore {
    /// Inserts a record and returns the store-assigned id.
    fn create(&mut self, record: &Record) -> StoreResult<RecordId>;
    /// Point lookup; `None` when no record has that id.
    fn read(&self, id: RecordId) -> StoreResult<Option<Record>>;
    /// Replaces the whole stored value keyed by `record.id` (upsert).
    fn update(&mut self, record: &Record) -> StoreResult<RecordId>;
    /// Removes a record; deleting a missing id succeeds.
    fn delete(&mut self, id: RecordId) -> StoreResult<()>;
    /// Every record in primary-key order.
    fn list_all(&self) -> StoreResult<Vec<Record>>;
    /// Records whose title contains `title_substring`, in title-index order.
    fn filter(&mut self, title_substring: &str) -> StoreResult<Vec<Record>>;
    /// Releases the underlying handle. Safe to call repeatedly.
    fn disconnect(&mut self);
}

/// Opens record stores; lets the executor defer connection until `init`.
pub trait StoreConnector {
    type Store: RecordStore;

    fn connect(&self) -> StoreResult<Self::Store>;
}

impl StoreConnector for StoreConfig {
    type Store = SqliteRecordStore;

    fn connect(&self) -> StoreResult<SqliteRecordStore> {
        SqliteRecordStore::connect(self)
    }
}

/// SQLite-backed record store owning its connection.
pub struct SqliteRecordStore {
    conn: Option<Connection>,
}

impl SqliteRecordStore {
    /// Opens (creating and migrating as needed) the store described by `config`.
    ///
    /// The config is validated first; a missing data directory is created.
    pub fn connect(config: &StoreConfig) -> StoreResult<Self> {
        config.validate().map_err(StoreError::Config)?;
        let conn = match (&config.data_dir, config.db_path()) {
            (Some(dir), Some(path)) => {
                std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDirectory {
                    dir: dir.clone(),
                    source,
                })?;
                open_db(path, config.busy_timeout())?
            }
            _ => open_db_in_memory()?,
        };
        info!(
            "event=store_connect module=store status=ok name={} persistent={}",
            config.name,
            config.data_dir.is_some()
        );
        Ok(Self { conn: Some(conn) })
    }

    /// Wraps a connection that already went through `db::open_*`.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Some(conn) }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Disconnected)
    }

    fn conn_mut(&mut self) -> StoreResult<&mut Connection> {
        self.conn.as_mut().ok_or(StoreError::Disconnected)
    }

    fn write<T>(
        &mut self,
        op: WriteOp,
        body: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let conn = self.conn_mut()?;
        let wrap = |source: rusqlite::Error| StoreError::Write { op, source };
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(wrap)?;
        // Dropping `tx` on error rolls the transaction back.
        let value = body(&tx).map_err(wrap)?;
        tx.commit().map_err(wrap)?;
        Ok(value)
    }
}

impl RecordStore for SqliteRecordStore {
    fn create(&mut self, record: &Record) -> StoreResult<RecordId> {
        let id = self.write(WriteOp::Create, |tx| {
            tx.execute(
                "INSERT INTO notes (id, title, notes) VALUES (?1, ?2, ?3);",
                params![record.id, record.title.as_str(), record.notes.as_str()],
            )?;
            Ok(tx.last_insert_rowid())
        })?;
        debug!("event=record_create module=store status=ok id={id}");
        Ok(id)
    }

    fn read(&self, id: RecordId) -> StoreResult<Option<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{RECORD_SELECT_SQL} WHERE id = ?1;"))
            .map_err(StoreError::Read)?;
        stmt.query_row([id], parse_record_row)
            .optional()
            .map_err(StoreError::Read)
    }

    fn update(&mut self, record: &Record) -> StoreResult<RecordId> {
        let id = record.id.ok_or(StoreError::MissingId)?;
        self.write(WriteOp::Update, |tx| {
            tx.execute(
                "INSERT INTO notes (id, title, notes) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    notes = excluded.notes;",
                params![id, record.title.as_str(), record.notes.as_str()],
            )
        })?;
        debug!("event=record_update module=store status=ok id={id}");
        Ok(id)
    }

    fn delete(&mut self, id: RecordId) -> StoreResult<()> {
        let removed = self.write(WriteOp::Delete, |tx| {
            tx.execute("DELETE FROM notes WHERE id = ?1;", [id])
        })?;
        debug!("event=record_delete module=store status=ok id={id} removed={removed}");
        Ok(())
    }

    fn list_all(&self) -> StoreResult<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{RECORD_SELECT_SQL} ORDER BY id ASC;"))
            .map_err(StoreError::Read)?;
        let rows = stmt
            .query_map([], parse_record_row)
            .map_err(StoreError::Read)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::Read)
    }

    fn filter(&mut self, title_substring: &str) -> StoreResult<Vec<Record>> {
        let conn = self.conn_mut()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(StoreError::Read)?;
        let mut matches = Vec::new();
        {
            // Walk the title index; containment is checked per row, not pruned.
            let mut stmt = tx
                .prepare(&format!(
                    "{RECORD_SELECT_SQL} INDEXED BY idx_notes_title ORDER BY title ASC;"
                ))
                .map_err(StoreError::Read)?;
            let mut rows = stmt.query([]).map_err(StoreError::Read)?;
            while let Some(row) = rows.next().map_err(StoreError::Read)? {
                let title: String = row.get("title").map_err(StoreError::Read)?;
                if title.contains(title_substring) {
                    matches.push(parse_record_row(row).map_err(StoreError::Read)?);
                }
            }
        }
        tx.commit().map_err(StoreError::Read)?;
        Ok(matches)
    }

    fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            // A failed close still releases the handle; nothing to retry.
            if let Err((_, err)) = conn.close() {
                warn!("event=store_disconnect module=store status=error error={err}");
                return;
            }
            info!("event=store_disconnect module=store status=ok");
        }
    }
}

impl Drop for SqliteRecordStore {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn parse_record_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: Some(row.get("id")?),
        title: row.get("title")?,
        notes: row.get("notes")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{RecordStore, SqliteRecordStore, StoreError};
    use crate::config::{ConfigError, StoreConfig};
    use crate::model::record::Record;

    #[test]
    fn operations_after_disconnect_are_rejected() {
        let mut store = SqliteRecordStore::connect(&StoreConfig::in_memory()).unwrap();
        store.disconnect();
        store.disconnect();

        assert!(!store.is_connected());
        assert!(matches!(store.read(1), Err(StoreError::Disconnected)));
        assert!(matches!(
            store.create(&Record::new("a", "b")),
            Err(StoreError::Disconnected)
        ));
    }

    #[test]
    fn update_without_id_is_rejected_before_touching_storage() {
        let mut store = SqliteRecordStore::connect(&StoreConfig::in_memory()).unwrap();
        let err = store.update(&Record::new("t", "n")).unwrap_err();
        assert!(matches!(err, StoreError::MissingId));
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn connect_rejects_invalid_config_before_opening() {
        let config = StoreConfig {
            name: String::new(),
            ..StoreConfig::in_memory()
        };
        let err = SqliteRecordStore::connect(&config).err().unwrap();
        assert!(matches!(err, StoreError::Config(ConfigError::EmptyName)));
    }
}
