use chrono::{NaiveDate, NaiveDateTime};
use notas_core::db::migrations::latest_version;
use notas_core::db::{open_db, open_db_in_memory, DbError};
use notas_core::{
    AdminGate, Collaborator, Column, FixedClock, IdRepairPolicy, NewNote, NoteStatus,
    NoteStorage, NoteStore, QuarantineReason, QuarantinedRow, RawNoteRow, SerialNumber,
    SqliteNoteStorage, StorageError,
};
use rusqlite::Connection;

fn at(year: i32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, 2, 3)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

fn open_store(storage: SqliteNoteStorage) -> NoteStore<SqliteNoteStorage, FixedClock> {
    NoteStore::open(
        storage,
        FixedClock(at(2024)),
        IdRepairPolicy::Reassign,
        AdminGate::new("Progen123"),
    )
    .unwrap()
}

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "notes");
    assert_table_exists(&conn, "quarantined_notes");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notas.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "notes");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match SqliteNoteStorage::open(&path).err() {
        Some(StorageError::Db(DbError::NewerSchema { found, supported })) => {
            assert_eq!(found, 999);
            assert_eq!(supported, latest_version());
        }
        Some(other) => panic!("unexpected error: {other}"),
        None => panic!("newer schema must be rejected"),
    }
}

#[test]
fn store_round_trips_through_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notas.sqlite3");

    let mut store = open_store(SqliteNoteStorage::open(&path).unwrap());
    store
        .create(NewNote::new("Contract Review", Collaborator::Nadya, NoteStatus::Drafting))
        .unwrap();
    store
        .create(
            NewNote::new("Audit", Collaborator::Uiter, NoteStatus::UnderReview)
                .with_external_ref("SEI-12"),
        )
        .unwrap();
    let expected = store.records().to_vec();
    drop(store);

    let reloaded = open_store(SqliteNoteStorage::open(&path).unwrap());
    assert_eq!(reloaded.records(), expected.as_slice());
    assert_eq!(reloaded.preview_next_serial().unwrap().formatted(), "0002/2024");

    let stored: i64 = reloaded
        .storage()
        .connection()
        .query_row("SELECT COUNT(*) FROM notes;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, 2);
}

#[test]
fn loosely_typed_cells_are_normalized() {
    let storage = SqliteNoteStorage::open_in_memory().unwrap();
    storage
        .connection()
        .execute(
            "INSERT INTO notes (id, subject, assignee, status, year, sequence, created_at)
             VALUES ('7.0', 'Audit', 'josé', 'Em análise', 2024.0, '2', '03/01/2024 10:15');",
            [],
        )
        .unwrap();

    let store = open_store(storage);
    let record = store.get(7).unwrap();
    assert_eq!(record.assignee, Collaborator::Jose);
    assert_eq!(record.status, NoteStatus::UnderReview);
    assert_eq!(record.serial, Some(SerialNumber::new(2024, 2)));
    assert_eq!(record.created_at.to_string(), "2024-01-03 10:15:00");
}

#[test]
fn unrepairable_rows_move_to_quarantine_table() {
    let mut storage = SqliteNoteStorage::open_in_memory().unwrap();
    storage
        .connection()
        .execute_batch(
            "INSERT INTO notes (id, subject, assignee, status) VALUES (1, 'Good', 'Yan', 'drafting');
             INSERT INTO notes (id, subject, assignee, status) VALUES (2, 'Odd', 'Maria', 'drafting');
             INSERT INTO notes (id, subject, assignee, year) VALUES (3, 'Half', 'Carla', 2024);",
        )
        .unwrap();
    assert_eq!(storage.load_rows().unwrap().map(|rows| rows.len()), Some(3));

    let store = open_store(storage);
    assert_eq!(store.records().len(), 1);
    assert_eq!(store.last_load_report().quarantined.len(), 2);

    let conn = store.storage().connection();
    let live: i64 = conn
        .query_row("SELECT COUNT(*) FROM notes;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(live, 1);
    let reasons: Vec<String> = conn
        .prepare("SELECT reason FROM quarantined_notes ORDER BY quarantine_id;")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        reasons,
        vec![
            "unknown assignee `Maria`".to_string(),
            "year and sequence must be set together".to_string(),
        ]
    );
}

#[test]
fn archiving_the_same_rows_twice_keeps_one_copy() {
    let mut storage = SqliteNoteStorage::open_in_memory().unwrap();
    let refused = vec![QuarantinedRow {
        row: RawNoteRow::new(1)
            .with(Column::Id, "3")
            .with(Column::Subject, "Half")
            .with(Column::Assignee, "Carla")
            .with(Column::Year, "2024"),
        reason: QuarantineReason::PartialSerial,
    }];

    storage.archive_quarantined(&refused).unwrap();
    storage.archive_quarantined(&refused).unwrap();

    let archived: i64 = storage
        .connection()
        .query_row("SELECT COUNT(*) FROM quarantined_notes;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(archived, 1);
}

#[test]
fn describe_names_backend() {
    let storage = SqliteNoteStorage::open_in_memory().unwrap();
    assert_eq!(storage.describe(), "sqlite::memory:");
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
