//! Core record keeping for technical notes.
//!
//! This crate owns the note invariants: year-scoped serial numbering, load-time
//! repair of persisted tables, and the password-gated admin operations.
//! Presentation layers only call into `NoteStore` and render its results.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, NotasConfig, StorageBackend};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::note::{
    Collaborator, NoteId, NoteRecord, NoteStatus, NoteValidationError, Published, Role,
    SerialNumber,
};
pub use repo::csv_storage::CsvNoteStorage;
pub use repo::memory_storage::InMemoryNoteStorage;
pub use repo::normalize::{IdRepairPolicy, LoadReport, QuarantineReason, QuarantinedRow};
pub use repo::sqlite_storage::SqliteNoteStorage;
pub use repo::storage::{Column, NoteStorage, RawNoteRow, StorageError, StorageResult};
pub use service::note_store::{
    AdminGate, AuthorizationFailure, NewNote, NoteEdit, NoteStore, StoreError, StoreResult,
};
pub use service::numbering::{next_serial, Clock, FixedClock, SystemClock};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
