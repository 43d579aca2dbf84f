//! Storage contract shared by every note backend.
//!
//! # Responsibility
//! - Define the fixed tabular schema (`Column`) and its legacy header aliases.
//! - Define the raw row shape that backends read before normalization.
//! - Define the `NoteStorage` trait used by the store service.
//!
//! # Invariants
//! - `save_records` replaces the full persisted set atomically from the
//!   caller's perspective.
//! - Backends never interpret cell contents; normalization owns that.

use crate::db::DbError;
use crate::model::note::NoteRecord;
use crate::repo::normalize::QuarantinedRow;
use chrono::NaiveDateTime;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Canonical timestamp format written by every backend.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Format written by the legacy spreadsheet tool.
pub const LEGACY_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M";

pub const COLUMN_COUNT: usize = 13;

pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by persistence backends.
#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Csv(csv::Error),
    Db(DbError),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "storage io error: {err}"),
            Self::Csv(err) => write!(f, "csv error: {err}"),
            Self::Db(err) => write!(f, "database error: {err}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::Db(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for StorageError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<tempfile::PersistError> for StorageError {
    fn from(value: tempfile::PersistError) -> Self {
        Self::Io(value.error)
    }
}

/// Recognized columns of the persisted note table, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Subject,
    ExternalProcessRef,
    RequiresInitialNumber,
    Year,
    Sequence,
    FormattedNumber,
    Assignee,
    Role,
    Status,
    CreatedAt,
    ReviewedAt,
    Published,
}

impl Column {
    pub const ALL: [Column; COLUMN_COUNT] = [
        Self::Id,
        Self::Subject,
        Self::ExternalProcessRef,
        Self::RequiresInitialNumber,
        Self::Year,
        Self::Sequence,
        Self::FormattedNumber,
        Self::Assignee,
        Self::Role,
        Self::Status,
        Self::CreatedAt,
        Self::ReviewedAt,
        Self::Published,
    ];

    /// Header written to tabular files.
    pub fn header(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Subject => "subject",
            Self::ExternalProcessRef => "externalProcessRef",
            Self::RequiresInitialNumber => "requiresInitialNumber",
            Self::Year => "year",
            Self::Sequence => "sequence",
            Self::FormattedNumber => "formattedNumber",
            Self::Assignee => "assignee",
            Self::Role => "role",
            Self::Status => "status",
            Self::CreatedAt => "createdAt",
            Self::ReviewedAt => "reviewedAt",
            Self::Published => "published",
        }
    }

    /// Header used by spreadsheets exported before the schema was renamed.
    pub fn legacy_header(self) -> &'static str {
        match self {
            Self::Id => "id_nota",
            Self::Subject => "nome_nota",
            Self::ExternalProcessRef => "num_sei",
            Self::RequiresInitialNumber => "flag_obrigatorio",
            Self::Year => "ano",
            Self::Sequence => "numero",
            Self::FormattedNumber => "numero_completo",
            Self::Assignee => "colaborador",
            Self::Role => "cargo",
            Self::Status => "status",
            Self::CreatedAt => "data_criacao",
            Self::ReviewedAt => "data_analise",
            Self::Published => "publicado",
        }
    }

    /// SQL column name in the `notes` table.
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Subject => "subject",
            Self::ExternalProcessRef => "external_process_ref",
            Self::RequiresInitialNumber => "requires_initial_number",
            Self::Year => "year",
            Self::Sequence => "sequence",
            Self::FormattedNumber => "formatted_number",
            Self::Assignee => "assignee",
            Self::Role => "role",
            Self::Status => "status",
            Self::CreatedAt => "created_at",
            Self::ReviewedAt => "reviewed_at",
            Self::Published => "published",
        }
    }

    /// Resolves a header cell (canonical or legacy, case-insensitive).
    pub fn from_header(value: &str) -> Option<Self> {
        let trimmed = value.trim_start_matches('\u{feff}').trim();
        Self::ALL.into_iter().find(|column| {
            column.header().eq_ignore_ascii_case(trimmed)
                || column.legacy_header().eq_ignore_ascii_case(trimmed)
        })
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One persisted row as untyped cells. Blank cells are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawNoteRow {
    /// 1-based position of the row in its source, for diagnostics.
    pub position: u64,
    cells: [Option<String>; COLUMN_COUNT],
}

impl RawNoteRow {
    pub fn new(position: u64) -> Self {
        Self {
            position,
            cells: Default::default(),
        }
    }

    pub fn get(&self, column: Column) -> Option<&str> {
        self.cells[column.index()].as_deref()
    }

    /// Sets a cell unless it is blank or already filled by an earlier alias.
    pub fn set(&mut self, column: Column, value: impl Into<String>) {
        let value = value.into();
        let slot = &mut self.cells[column.index()];
        if slot.is_none() && !value.trim().is_empty() {
            *slot = Some(value);
        }
    }

    /// Builder-style `set`, handy for fixtures.
    pub fn with(mut self, column: Column, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    /// Cells in `Column::ALL` order.
    pub fn cells(&self) -> &[Option<String>; COLUMN_COUNT] {
        &self.cells
    }

    /// Serializes a record into its canonical persisted cells.
    pub fn from_record(position: u64, record: &NoteRecord) -> Self {
        let mut row = Self::new(position);
        row.set(Column::Id, record.id.to_string());
        row.set(Column::Subject, record.subject.as_str());
        if let Some(reference) = &record.external_process_ref {
            row.set(Column::ExternalProcessRef, reference.as_str());
        }
        row.set(
            Column::RequiresInitialNumber,
            record.requires_initial_number.to_string(),
        );
        if let Some(serial) = record.serial {
            row.set(Column::Year, serial.year.to_string());
            row.set(Column::Sequence, serial.sequence.to_string());
            row.set(Column::FormattedNumber, serial.formatted());
        }
        row.set(Column::Assignee, record.assignee.name());
        row.set(Column::Role, record.role().label());
        row.set(Column::Status, record.status.as_str());
        row.set(Column::CreatedAt, format_timestamp(record.created_at));
        if let Some(reviewed_at) = record.reviewed_at {
            row.set(Column::ReviewedAt, format_timestamp(reviewed_at));
        }
        if let Some(published) = record.published {
            row.set(Column::Published, published.as_str());
        }
        row
    }
}

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Persistence backend for the full note set.
pub trait NoteStorage {
    /// Short human-readable location, used in logs.
    fn describe(&self) -> String;
    /// Reads every row, or `None` when the storage does not exist yet.
    fn load_rows(&mut self) -> StorageResult<Option<Vec<RawNoteRow>>>;
    /// Creates empty storage carrying the fixed schema.
    fn initialize(&mut self) -> StorageResult<()>;
    /// Replaces the persisted set with `records`.
    fn save_records(&mut self, records: &[NoteRecord]) -> StorageResult<()>;
    /// Keeps rows that normalization refused so they can be repaired by hand.
    /// Rows whose cells and reason are already archived are skipped.
    fn archive_quarantined(&mut self, rows: &[QuarantinedRow]) -> StorageResult<()>;
}

impl<S: NoteStorage + ?Sized> NoteStorage for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn load_rows(&mut self) -> StorageResult<Option<Vec<RawNoteRow>>> {
        (**self).load_rows()
    }

    fn initialize(&mut self) -> StorageResult<()> {
        (**self).initialize()
    }

    fn save_records(&mut self, records: &[NoteRecord]) -> StorageResult<()> {
        (**self).save_records(records)
    }

    fn archive_quarantined(&mut self, rows: &[QuarantinedRow]) -> StorageResult<()> {
        (**self).archive_quarantined(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::note::{Collaborator, NoteStatus, SerialNumber};
    use chrono::NaiveDate;

    #[test]
    fn header_lookup_accepts_canonical_and_legacy_names() {
        assert_eq!(Column::from_header("id"), Some(Column::Id));
        assert_eq!(Column::from_header("\u{feff}id_nota"), Some(Column::Id));
        assert_eq!(Column::from_header(" NUMERO "), Some(Column::Sequence));
        assert_eq!(Column::from_header("formattedNumber"), Some(Column::FormattedNumber));
        assert_eq!(Column::from_header("notes"), None);
    }

    #[test]
    fn set_ignores_blank_and_keeps_first_alias() {
        let mut row = RawNoteRow::new(1);
        row.set(Column::Subject, "  ");
        assert_eq!(row.get(Column::Subject), None);
        row.set(Column::Subject, "first");
        row.set(Column::Subject, "second");
        assert_eq!(row.get(Column::Subject), Some("first"));
    }

    #[test]
    fn from_record_writes_derived_columns() {
        let created = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(8, 5, 0)
            .unwrap();
        let mut record =
            NoteRecord::new(3, "Audit", Collaborator::Jose, NoteStatus::UnderReview, created);
        record.serial = Some(SerialNumber::new(2024, 2));

        let row = RawNoteRow::from_record(1, &record);
        assert_eq!(row.get(Column::FormattedNumber), Some("0002/2024"));
        assert_eq!(row.get(Column::Role), Some("Administrative Analyst"));
        assert_eq!(row.get(Column::Assignee), Some("José"));
        assert_eq!(row.get(Column::Status), Some("under_review"));
        assert_eq!(row.get(Column::CreatedAt), Some("2024-02-01 08:05:00"));
        assert_eq!(row.get(Column::ReviewedAt), None);
        assert_eq!(row.get(Column::RequiresInitialNumber), Some("false"));
    }
}
