//! Process-local note storage.
//!
//! Holds persisted rows in memory. Used for previews and tests.

use crate::model::note::NoteRecord;
use crate::repo::normalize::QuarantinedRow;
use crate::repo::storage::{NoteStorage, RawNoteRow, StorageError, StorageResult};
use std::io::{Error as IoError, ErrorKind};

#[derive(Debug, Clone, Default)]
pub struct InMemoryNoteStorage {
    rows: Option<Vec<RawNoteRow>>,
    quarantined: Vec<QuarantinedRow>,
    save_count: usize,
    fail_saves: bool,
}

impl InMemoryNoteStorage {
    /// Empty storage that does not "exist" until first initialized.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with raw rows, as if read from a file.
    pub fn with_rows(rows: Vec<RawNoteRow>) -> Self {
        Self {
            rows: Some(rows),
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Option<&[RawNoteRow]> {
        self.rows.as_deref()
    }

    pub fn quarantined(&self) -> &[QuarantinedRow] {
        &self.quarantined
    }

    /// Number of successful `save_records`/`initialize` calls.
    pub fn save_count(&self) -> usize {
        self.save_count
    }

    /// Makes subsequent saves fail, to exercise rollback paths.
    pub fn set_fail_saves(&mut self, fail: bool) {
        self.fail_saves = fail;
    }
}

impl NoteStorage for InMemoryNoteStorage {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn load_rows(&mut self) -> StorageResult<Option<Vec<RawNoteRow>>> {
        Ok(self.rows.clone())
    }

    fn initialize(&mut self) -> StorageResult<()> {
        self.save_records(&[])
    }

    fn save_records(&mut self, records: &[NoteRecord]) -> StorageResult<()> {
        if self.fail_saves {
            return Err(StorageError::Io(IoError::new(
                ErrorKind::Other,
                "in-memory storage rejected the write",
            )));
        }
        self.rows = Some(
            records
                .iter()
                .enumerate()
                .map(|(index, record)| RawNoteRow::from_record(index as u64 + 1, record))
                .collect(),
        );
        self.save_count += 1;
        Ok(())
    }

    fn archive_quarantined(&mut self, rows: &[QuarantinedRow]) -> StorageResult<()> {
        for row in rows {
            if !self.quarantined.contains(row) {
                self.quarantined.push(row.clone());
            }
        }
        Ok(())
    }
}
