//! Configuration for the note store.
//!
//! Loads a JSON file where every field is optional, then applies environment
//! overrides. Also maps a configured data file to its storage backend.

use crate::repo::csv_storage::CsvNoteStorage;
use crate::repo::normalize::IdRepairPolicy;
use crate::repo::sqlite_storage::SqliteNoteStorage;
use crate::repo::storage::{NoteStorage, StorageResult};
use crate::service::note_store::{AdminGate, NoteStore, StoreResult};
use crate::service::numbering::SystemClock;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_FILE: &str = "notas_tecnicas.csv";
pub const DEFAULT_ADMIN_SECRET: &str = "Progen123";
pub const ENV_DATA_FILE: &str = "NOTAS_DATA_FILE";
pub const ENV_ADMIN_SECRET: &str = "NOTAS_ADMIN_SECRET";

/// Error raised while reading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotasConfig {
    /// Note table location; the extension selects the backend.
    pub data_file: PathBuf,
    /// Shared password for destructive admin actions.
    pub admin_secret: String,
    pub id_repair: IdRepairPolicy,
    /// `trace|debug|info|warn|error`; defaults by build mode.
    pub log_level: Option<String>,
    /// Absolute directory for rolling log files. Logging is off when unset.
    pub log_dir: Option<String>,
}

impl Default for NotasConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            admin_secret: DEFAULT_ADMIN_SECRET.to_string(),
            id_repair: IdRepairPolicy::default(),
            log_level: None,
            log_dir: None,
        }
    }
}

impl std::fmt::Debug for NotasConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotasConfig")
            .field("data_file", &self.data_file)
            .field("admin_secret", &"<redacted>")
            .field("id_repair", &self.id_repair)
            .field("log_level", &self.log_level)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl NotasConfig {
    /// Reads `path`; a missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Applies `NOTAS_DATA_FILE` / `NOTAS_ADMIN_SECRET` from the process env.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup; blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(data_file) = non_blank(ENV_DATA_FILE) {
            self.data_file = PathBuf::from(data_file);
        }
        if let Some(secret) = non_blank(ENV_ADMIN_SECRET) {
            self.admin_secret = secret;
        }
    }

    pub fn admin_gate(&self) -> AdminGate {
        AdminGate::new(self.admin_secret.clone())
    }

    pub fn backend(&self) -> StorageBackend {
        StorageBackend::for_path(&self.data_file)
    }

    /// Opens the configured backend and loads the store.
    pub fn open_store(&self) -> StoreResult<NoteStore<Box<dyn NoteStorage>, SystemClock>> {
        let storage = self.backend().open(&self.data_file)?;
        NoteStore::open(storage, SystemClock, self.id_repair, self.admin_gate())
    }
}

/// Storage backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Csv,
    Sqlite,
}

impl StorageBackend {
    /// `.db`, `.sqlite` and `.sqlite3` use SQLite; everything else is CSV.
    pub fn for_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        match extension.as_deref() {
            Some("db" | "sqlite" | "sqlite3") => Self::Sqlite,
            _ => Self::Csv,
        }
    }

    pub fn open(self, path: &Path) -> StorageResult<Box<dyn NoteStorage>> {
        let storage: Box<dyn NoteStorage> = match self {
            Self::Csv => Box::new(CsvNoteStorage::new(path)),
            Self::Sqlite => Box::new(SqliteNoteStorage::open(path)?),
        };
        Ok(storage)
    }
}
