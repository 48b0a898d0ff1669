//! Store and channel configuration.
//!
//! # Responsibility
//! - Describe where the notes store lives and how long calls may wait.
//! - Load settings from JSON with defaults for every optional field.
//!
//! # Invariants
//! - A validated config has a non-empty, separator-free store name and
//!   non-zero timeouts.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_STORE_NAME: &str = "notes";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
const STORE_FILE_EXTENSION: &str = "sqlite3";

/// Invalid configuration input.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    EmptyName,
    InvalidName(String),
    ZeroTimeout(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid store config: {err}"),
            Self::EmptyName => write!(f, "store name cannot be empty"),
            Self::InvalidName(name) => {
                write!(f, "store name `{name}` must not contain path separators")
            }
            Self::ZeroTimeout(field) => write!(f, "`{field}` must be greater than zero"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Settings for one notes store and the channel that fronts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store name; also the database file stem.
    pub name: String,
    /// Directory holding the database file. `None` keeps the store in memory.
    pub data_dir: Option<PathBuf>,
    /// How long SQLite waits on a locked database.
    pub busy_timeout_ms: u64,
    /// How long a channel call waits for its response.
    pub call_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_STORE_NAME.to_string(),
            data_dir: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// In-memory store with default timeouts.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed store under `data_dir` with default name and timeouts.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: Some(data_dir.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON config document.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks name and timeout constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("busy_timeout_ms"));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("call_timeout_ms"));
        }
        Ok(())
    }

    /// Database file path, or `None` for an in-memory store.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| {
            dir.join(format!("{}.{STORE_FILE_EXTENSION}", self.name.trim()))
        })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
