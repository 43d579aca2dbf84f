//! CSV-file note storage.
//!
//! # Responsibility
//! - Read the note table from a CSV file, tolerating legacy headers, extra
//!   columns and short rows.
//! - Write the full table through a temp file + rename.
//! - Keep quarantined rows in a `<stem>.quarantine.csv` sidecar.
//!
//! # Invariants
//! - Readers never observe a partially written table.
//! - Written files always carry the canonical header in `Column::ALL` order.

use crate::model::note::NoteRecord;
use crate::repo::normalize::QuarantinedRow;
use crate::repo::storage::{Column, NoteStorage, RawNoteRow, StorageResult};
use log::{error, info};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

const QUARANTINE_SUFFIX: &str = "quarantine.csv";
const REASON_HEADER: &str = "reason";

/// Note storage backed by one CSV file.
#[derive(Debug, Clone)]
pub struct CsvNoteStorage {
    path: PathBuf,
}

impl CsvNoteStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file that receives quarantined rows.
    pub fn quarantine_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "notes".to_string());
        self.path
            .with_file_name(format!("{stem}.{QUARANTINE_SUFFIX}"))
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn read_rows(&self) -> StorageResult<Vec<RawNoteRow>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let columns: Vec<Option<Column>> =
            reader.headers()?.iter().map(Column::from_header).collect();

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result?;
            let mut row = RawNoteRow::new(index as u64 + 1);
            for (cell, column) in record.iter().zip(&columns) {
                if let Some(column) = column {
                    row.set(*column, cell);
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Cells (reason last) of every row already in the quarantine sidecar.
    fn archived_rows(&self) -> StorageResult<HashSet<Vec<String>>> {
        let path = self.quarantine_path();
        if !path.exists() {
            return Ok(HashSet::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&path)?;
        let mut archived = HashSet::new();
        for result in reader.records() {
            let record = result?;
            archived.insert(record.iter().map(str::to_string).collect());
        }
        Ok(archived)
    }

    fn write_atomically(&self, records: &[NoteRecord]) -> StorageResult<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = csv::Writer::from_writer(temp.as_file_mut());
            writer.write_record(Column::ALL.iter().map(|column| column.header()))?;
            for (index, record) in records.iter().enumerate() {
                let row = RawNoteRow::from_record(index as u64 + 1, record);
                writer.write_record(
                    row.cells()
                        .iter()
                        .map(|cell| cell.as_deref().unwrap_or("")),
                )?;
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path)?;
        Ok(())
    }
}

impl NoteStorage for CsvNoteStorage {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn load_rows(&mut self) -> StorageResult<Option<Vec<RawNoteRow>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let started_at = Instant::now();
        match self.read_rows() {
            Ok(rows) => {
                info!(
                    "event=storage_read module=repo status=ok backend=csv rows={} duration_ms={}",
                    rows.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(Some(rows))
            }
            Err(err) => {
                error!(
                    "event=storage_read module=repo status=error backend=csv error={}",
                    err
                );
                Err(err)
            }
        }
    }

    fn initialize(&mut self) -> StorageResult<()> {
        self.write_atomically(&[])
    }

    fn save_records(&mut self, records: &[NoteRecord]) -> StorageResult<()> {
        let started_at = Instant::now();
        match self.write_atomically(records) {
            Ok(()) => {
                info!(
                    "event=storage_write module=repo status=ok backend=csv rows={} duration_ms={}",
                    records.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=storage_write module=repo status=error backend=csv error={}",
                    err
                );
                Err(err)
            }
        }
    }

    fn archive_quarantined(&mut self, rows: &[QuarantinedRow]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut archived = self.archived_rows()?;
        let pending: Vec<Vec<String>> = rows
            .iter()
            .map(|quarantined| {
                let mut cells: Vec<String> = quarantined
                    .row
                    .cells()
                    .iter()
                    .map(|cell| cell.clone().unwrap_or_default())
                    .collect();
                cells.push(quarantined.reason.to_string());
                cells
            })
            .filter(|cells| archived.insert(cells.clone()))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let path = self.quarantine_path();
        let write_header = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::Writer::from_writer(file);
        if write_header {
            let mut header: Vec<&str> = Column::ALL.iter().map(|column| column.header()).collect();
            header.push(REASON_HEADER);
            writer.write_record(header)?;
        }
        for cells in &pending {
            writer.write_record(cells)?;
        }
        writer.flush()?;

        info!(
            "event=quarantine_write module=repo status=ok backend=csv rows={} skipped={}",
            pending.len(),
            rows.len() - pending.len()
        );
        Ok(())
    }
}
