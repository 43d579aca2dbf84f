//! SQLite-backed note storage.
//!
//! # Responsibility
//! - Persist the note table inside a migrated SQLite database.
//! - Read every cell leniently as text so normalization stays backend-agnostic.
//!
//! # Invariants
//! - `save_records` replaces the `notes` table inside one transaction.
//! - Row order is preserved through the `position` column.

use crate::db::{open_db, open_db_in_memory};
use crate::model::note::NoteRecord;
use crate::repo::normalize::QuarantinedRow;
use crate::repo::storage::{Column, NoteStorage, RawNoteRow, StorageResult};
use log::info;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use std::path::{Path, PathBuf};

/// Note storage backed by a SQLite database.
pub struct SqliteNoteStorage {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteNoteStorage {
    /// Opens (and migrates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = open_db(path.as_ref())?;
        Ok(Self {
            conn,
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
            path: None,
        })
    }

    /// Raw connection, for diagnostics and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn column_list() -> String {
        Column::ALL
            .iter()
            .map(|column| column.sql_name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn placeholders(count: usize) -> String {
        (1..=count)
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl NoteStorage for SqliteNoteStorage {
    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("sqlite:{}", path.display()),
            None => "sqlite::memory:".to_string(),
        }
    }

    fn load_rows(&mut self) -> StorageResult<Option<Vec<RawNoteRow>>> {
        let sql = format!(
            "SELECT position, {} FROM notes ORDER BY position ASC;",
            Self::column_list()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut loaded = Vec::new();

        while let Some(row) = rows.next()? {
            let position: i64 = row.get(0)?;
            let mut raw = RawNoteRow::new(u64::try_from(position).unwrap_or_default());
            for (offset, column) in Column::ALL.iter().enumerate() {
                if let Some(text) = value_as_text(row.get_ref(offset + 1)?) {
                    raw.set(*column, text);
                }
            }
            loaded.push(raw);
        }

        info!(
            "event=storage_read module=repo status=ok backend=sqlite rows={}",
            loaded.len()
        );
        Ok(Some(loaded))
    }

    fn initialize(&mut self) -> StorageResult<()> {
        self.save_records(&[])
    }

    fn save_records(&mut self, records: &[NoteRecord]) -> StorageResult<()> {
        let sql = format!(
            "INSERT INTO notes ({}) VALUES ({});",
            Self::column_list(),
            Self::placeholders(Column::ALL.len())
        );

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM notes;", [])?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for (index, record) in records.iter().enumerate() {
                let row = RawNoteRow::from_record(index as u64 + 1, record);
                stmt.execute(params_from_iter(row.cells().iter()))?;
            }
        }
        tx.commit()?;

        info!(
            "event=storage_write module=repo status=ok backend=sqlite rows={}",
            records.len()
        );
        Ok(())
    }

    fn archive_quarantined(&mut self, rows: &[QuarantinedRow]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO quarantined_notes (reason, {}) VALUES ({});",
            Self::column_list(),
            Self::placeholders(Column::ALL.len() + 1)
        );

        let matches = std::iter::once("reason".to_string())
            .chain(Column::ALL.iter().map(|column| column.sql_name().to_string()))
            .enumerate()
            .map(|(index, name)| format!("{name} IS ?{}", index + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let exists_sql =
            format!("SELECT EXISTS(SELECT 1 FROM quarantined_notes WHERE {matches});");

        let mut written = 0;
        let tx = self.conn.transaction()?;
        {
            let mut exists = tx.prepare(&exists_sql)?;
            let mut insert = tx.prepare(&sql)?;
            for quarantined in rows {
                let mut values: Vec<Option<String>> = vec![Some(quarantined.reason.to_string())];
                values.extend(quarantined.row.cells().iter().cloned());
                let archived: bool =
                    exists.query_row(params_from_iter(values.iter()), |row| row.get(0))?;
                if !archived {
                    insert.execute(params_from_iter(values))?;
                    written += 1;
                }
            }
        }
        tx.commit()?;

        info!(
            "event=quarantine_write module=repo status=ok backend=sqlite rows={} skipped={}",
            written,
            rows.len() - written
        );
        Ok(())
    }
}

fn value_as_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(number) => Some(number.to_string()),
        ValueRef::Real(number) => Some(number.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
