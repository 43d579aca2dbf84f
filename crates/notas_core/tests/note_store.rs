use chrono::{NaiveDate, NaiveDateTime};
use notas_core::{
    AdminGate, AuthorizationFailure, Collaborator, Column, FixedClock, IdRepairPolicy,
    InMemoryNoteStorage, NewNote, NoteEdit, NoteStatus, NoteStore, NoteValidationError,
    Published, RawNoteRow, SerialNumber, StoreError,
};

const SECRET: &str = "Progen123";

type MemoryStore = NoteStore<InMemoryNoteStorage, FixedClock>;

fn at(year: i32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, 4, 10)
        .unwrap()
        .and_hms_opt(14, 30, 0)
        .unwrap()
}

fn open_store(year: i32) -> MemoryStore {
    open_with(InMemoryNoteStorage::new(), year)
}

fn open_with(storage: InMemoryNoteStorage, year: i32) -> MemoryStore {
    NoteStore::open(
        storage,
        FixedClock(at(year)),
        IdRepairPolicy::Reassign,
        AdminGate::new(SECRET),
    )
    .unwrap()
}

fn reopen(store: MemoryStore, year: i32) -> MemoryStore {
    let storage = store.storage().clone();
    open_with(storage, year)
}

fn draft(subject: &str) -> NewNote {
    NewNote::new(subject, Collaborator::Carla, NoteStatus::Drafting)
}

fn review(subject: &str) -> NewNote {
    NewNote::new(subject, Collaborator::Lucas, NoteStatus::UnderReview)
}

/// Builds the three-note store used by the numbering walkthrough.
fn walkthrough_store() -> MemoryStore {
    let mut store = open_store(2024);
    store.create(draft("Contract Review")).unwrap();
    store.create(review("Audit")).unwrap();
    store.create(review("Inspection")).unwrap();
    store
}

#[test]
fn opening_absent_storage_initializes_it_empty() {
    let store = open_store(2024);
    assert!(store.records().is_empty());
    assert_eq!(store.storage().rows(), Some(&[][..]));
    assert_eq!(store.next_id(), 1);
    assert_eq!(store.preview_next_serial().unwrap().formatted(), "0001/2024");
}

#[test]
fn walkthrough_numbers_notes_in_review_order() {
    let mut store = open_store(2024);

    let first = store.create(draft("Contract Review")).unwrap();
    assert_eq!(first, 1);
    let record = store.get(1).unwrap();
    assert_eq!(record.serial, None);
    assert_eq!(record.year(), None);
    assert_eq!(record.reviewed_at, None);
    assert_eq!(record.role().label(), "Engineer");

    let second = store.create(review("Audit")).unwrap();
    let record = store.get(second).unwrap();
    assert_eq!(record.sequence(), Some(1));
    assert_eq!(record.formatted_number().as_deref(), Some("0001/2024"));
    assert_eq!(record.reviewed_at, Some(at(2024)));

    let third = store.create(review("Inspection")).unwrap();
    assert_eq!(
        store.get(third).unwrap().formatted_number().as_deref(),
        Some("0002/2024")
    );

    let mut edit = NoteEdit::from_record(store.get(1).unwrap());
    edit.status = NoteStatus::UnderReview;
    let updated = store.update(1, edit).unwrap();
    assert_eq!(updated.serial, Some(SerialNumber::new(2024, 3)));
    assert_eq!(store.get(1).unwrap().formatted_number().as_deref(), Some("0003/2024"));
}

#[test]
fn delete_removes_only_the_target_and_numbering_follows_remaining_max() {
    let mut store = walkthrough_store();

    assert!(store.delete(2, SECRET, true).unwrap());
    let ids: Vec<u64> = store.records().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(store.preview_next_serial().unwrap(), SerialNumber::new(2024, 3));

    assert!(store.delete(3, SECRET, true).unwrap());
    assert_eq!(store.preview_next_serial().unwrap(), SerialNumber::new(2024, 1));
}

#[test]
fn creating_n_review_notes_yields_dense_sequences() {
    let mut store = open_store(2024);
    for index in 0..12 {
        store.create(review(&format!("note {index}"))).unwrap();
    }
    let sequences: Vec<u32> = store
        .records()
        .iter()
        .map(|record| record.sequence().unwrap())
        .collect();
    assert_eq!(sequences, (1..=12).collect::<Vec<u32>>());
}

#[test]
fn flag_numbers_a_draft_at_creation() {
    let mut store = open_store(2024);
    let id = store
        .create(draft("Urgent").requiring_initial_number(true))
        .unwrap();
    let record = store.get(id).unwrap();
    assert_eq!(record.status, NoteStatus::Drafting);
    assert_eq!(record.formatted_number().as_deref(), Some("0001/2024"));
}

#[test]
fn create_rejects_blank_subject_and_concluded_status() {
    let mut store = open_store(2024);

    let err = store.create(draft("   ")).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(NoteValidationError::EmptySubject)
    ));

    let err = store
        .create(NewNote::new("x", Collaborator::Yan, NoteStatus::Concluded))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(NoteValidationError::InvalidInitialStatus(_))
    ));
    assert!(store.records().is_empty());
}

#[test]
fn create_trims_subject_and_reference() {
    let mut store = open_store(2024);
    let id = store
        .create(draft("  Contract Review ").with_external_ref(" 23000.000123/2024-11 "))
        .unwrap();
    let record = store.get(id).unwrap();
    assert_eq!(record.subject, "Contract Review");
    assert_eq!(
        record.external_process_ref.as_deref(),
        Some("23000.000123/2024-11")
    );
}

#[test]
fn update_is_idempotent_for_numbered_notes() {
    let mut store = walkthrough_store();
    let before = store.get(2).unwrap().clone();

    let mut edit = NoteEdit::from_record(&before);
    edit.requires_initial_number = true;
    let after = store.update(2, edit.clone()).unwrap();
    assert_eq!(after.serial, before.serial);
    assert_eq!(after.reviewed_at, before.reviewed_at);

    edit.status = NoteStatus::Drafting;
    edit.requires_initial_number = false;
    let after = store.update(2, edit).unwrap();
    assert_eq!(after.serial, before.serial);
    assert_eq!(store.preview_next_serial().unwrap(), SerialNumber::new(2024, 3));
}

#[test]
fn update_unknown_id_is_not_found() {
    let mut store = walkthrough_store();
    let edit = NoteEdit::from_record(store.get(1).unwrap());
    let err = store.update(99, edit).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(99)));
}

#[test]
fn update_rejects_blank_subject_without_side_effects() {
    let mut store = walkthrough_store();
    let mut edit = NoteEdit::from_record(store.get(1).unwrap());
    edit.subject = " ".to_string();
    edit.status = NoteStatus::UnderReview;
    assert!(store.update(1, edit).is_err());
    assert!(!store.get(1).unwrap().is_numbered());
}

#[test]
fn concluding_requires_a_published_answer() {
    let mut store = walkthrough_store();
    let mut edit = NoteEdit::from_record(store.get(2).unwrap());
    edit.status = NoteStatus::Concluded;
    edit.published = None;

    let err = store.update(2, edit.clone()).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(NoteValidationError::MissingPublishedAnswer)
    ));
    assert_eq!(store.get(2).unwrap().status, NoteStatus::UnderReview);

    edit.published = Some(Published::Yes);
    let concluded = store.update(2, edit).unwrap();
    assert_eq!(concluded.status, NoteStatus::Concluded);
    assert_eq!(concluded.published, Some(Published::Yes));
}

#[test]
fn published_is_carried_over_when_not_concluded() {
    let mut store = walkthrough_store();
    let mut edit = NoteEdit::from_record(store.get(2).unwrap());
    edit.status = NoteStatus::Concluded;
    edit.published = Some(Published::No);
    store.update(2, edit).unwrap();

    let mut reopen_edit = NoteEdit::from_record(store.get(2).unwrap());
    reopen_edit.status = NoteStatus::UnderReview;
    reopen_edit.published = Some(Published::Yes);
    let reopened = store.update(2, reopen_edit).unwrap();
    assert_eq!(reopened.published, Some(Published::No));
}

#[test]
fn delete_requires_secret_and_confirmation() {
    let mut store = walkthrough_store();
    let saves = store.storage().save_count();

    let err = store.delete(1, "wrong", true).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Authorization(AuthorizationFailure::WrongCredential)
    ));
    let err = store.delete(1, SECRET, false).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Authorization(AuthorizationFailure::NotConfirmed)
    ));

    assert_eq!(store.records().len(), 3);
    assert_eq!(store.storage().save_count(), saves);
}

#[test]
fn delete_of_unknown_id_is_a_noop() {
    let mut store = walkthrough_store();
    let saves = store.storage().save_count();
    assert!(!store.delete(42, SECRET, true).unwrap());
    assert_eq!(store.records().len(), 3);
    assert_eq!(store.storage().save_count(), saves);
}

#[test]
fn clear_requires_secret_and_confirmation() {
    let mut store = walkthrough_store();

    assert!(store.clear("", true).is_err());
    assert!(store.clear(SECRET, false).is_err());
    assert_eq!(store.records().len(), 3);

    assert_eq!(store.clear(SECRET, true).unwrap(), 3);
    assert!(store.records().is_empty());
    assert_eq!(store.storage().rows(), Some(&[][..]));
    assert_eq!(store.next_id(), 1);
}

#[test]
fn failed_persist_rolls_back_memory() {
    let mut store = walkthrough_store();
    store.storage_mut().set_fail_saves(true);

    let err = store.create(review("Lost")).unwrap_err();
    assert!(matches!(err, StoreError::Storage(_)));
    assert_eq!(store.records().len(), 3);

    assert!(store.clear(SECRET, true).is_err());
    assert_eq!(store.records().len(), 3);

    store.storage_mut().set_fail_saves(false);
    let id = store.create(review("Kept")).unwrap();
    assert_eq!(store.get(id).unwrap().sequence(), Some(3));
}

#[test]
fn sequences_survive_reload_and_restart_each_year() {
    let store = walkthrough_store();
    let mut store = reopen(store, 2024);
    let id = store.create(review("After reload")).unwrap();
    assert_eq!(store.get(id).unwrap().sequence(), Some(3));

    let mut store = reopen(store, 2025);
    assert_eq!(store.preview_next_serial().unwrap().formatted(), "0001/2025");
    let id = store.create(review("New year")).unwrap();
    assert_eq!(
        store.get(id).unwrap().formatted_number().as_deref(),
        Some("0001/2025")
    );
    assert_eq!(store.get(2).unwrap().formatted_number().as_deref(), Some("0001/2024"));
}

#[test]
fn persist_then_load_reproduces_records() {
    let mut store = walkthrough_store();
    let mut edit = NoteEdit::from_record(store.get(3).unwrap());
    edit.status = NoteStatus::Concluded;
    edit.published = Some(Published::Yes);
    edit.external_process_ref = Some("SEI 123".to_string());
    store.update(3, edit).unwrap();

    let original = store.records().to_vec();
    let reloaded = reopen(store, 2024);
    assert_eq!(reloaded.records(), original.as_slice());
    assert!(!reloaded.last_load_report().repaired());
}

#[test]
fn display_order_is_year_sequence_then_id_descending() {
    let rows = vec![
        row(1, "Old", Some((2023, 9))),
        row(2, "Draft A", None),
        row(3, "First", Some((2024, 1))),
        row(4, "Second", Some((2024, 2))),
        row(5, "Draft B", None),
    ];
    let store = open_with(InMemoryNoteStorage::with_rows(rows), 2024);
    let order: Vec<u64> = store
        .sorted_for_display()
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(order, vec![4, 3, 1, 5, 2]);
}

#[test]
fn load_repairs_are_written_back_and_quarantined() {
    let rows = vec![
        row(1, "Good", Some((2024, 4))),
        row(2, "", None),
        RawNoteRow::new(3)
            .with(Column::Id, "3")
            .with(Column::Subject, "Half numbered")
            .with(Column::Assignee, "Pedro")
            .with(Column::Year, "2024"),
        row(4, "No id", None).with_id(""),
    ];
    let store = open_with(InMemoryNoteStorage::with_rows(rows), 2024);

    let report = store.last_load_report();
    assert_eq!(report.dropped_blank, 1);
    assert_eq!(report.quarantined.len(), 1);
    assert_eq!(store.storage().quarantined().len(), 1);

    let ids: Vec<u64> = store.records().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 4]);
    assert_eq!(store.storage().rows().unwrap().len(), 2);
    assert_eq!(store.preview_next_serial().unwrap(), SerialNumber::new(2024, 5));
}

#[test]
fn legacy_policy_renumbers_every_id() {
    let rows = vec![
        row(1, "a", None).with_id("7"),
        row(2, "b", None).with_id("x"),
        row(3, "c", None).with_id("9"),
    ];
    let store = NoteStore::open(
        InMemoryNoteStorage::with_rows(rows),
        FixedClock(at(2024)),
        IdRepairPolicy::RenumberAll,
        AdminGate::new(SECRET),
    )
    .unwrap();
    let ids: Vec<u64> = store.records().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(store.last_load_report().renumbered_all);
}

#[test]
fn flag_numbers_an_existing_draft_on_update() {
    let mut store = open_store(2024);
    let draft_id = store.create(draft("Contract Review")).unwrap();
    store.create(review("Audit")).unwrap();
    assert!(!store.get(draft_id).unwrap().is_numbered());

    let mut edit = NoteEdit::from_record(store.get(draft_id).unwrap());
    edit.requires_initial_number = true;
    let updated = store.update(draft_id, edit).unwrap();

    assert_eq!(updated.status, NoteStatus::Drafting);
    assert!(updated.requires_initial_number);
    assert_eq!(updated.serial, Some(SerialNumber::new(2024, 2)));
    assert_eq!(updated.reviewed_at, Some(at(2024)));
    assert_eq!(store.preview_next_serial().unwrap(), SerialNumber::new(2024, 3));
}

#[test]
fn ids_of_quarantined_rows_are_not_reused() {
    let rows = vec![
        row(1, "Good", Some((2024, 1))),
        RawNoteRow::new(2)
            .with(Column::Id, "2")
            .with(Column::Subject, "Sequence only")
            .with(Column::Assignee, "Nadya")
            .with(Column::Sequence, "2"),
    ];
    let mut store = open_with(InMemoryNoteStorage::with_rows(rows), 2024);
    assert_eq!(store.last_load_report().quarantined.len(), 1);
    assert_eq!(store.next_id(), 3);

    let id = store.create(draft("Fresh")).unwrap();
    assert_eq!(id, 3);
}

#[test]
fn exhausted_serial_is_quarantined_instead_of_stalling_numbering() {
    let rows = vec![row(1, "Last of the year", Some((2024, u32::MAX)))];
    let mut store = open_with(InMemoryNoteStorage::with_rows(rows), 2024);

    assert!(store.records().is_empty());
    assert_eq!(store.storage().quarantined().len(), 1);
    assert_eq!(store.preview_next_serial().unwrap(), SerialNumber::new(2024, 1));

    let id = store.create(review("Audit")).unwrap();
    assert_eq!(id, 2);
    assert_eq!(store.get(id).unwrap().sequence(), Some(1));
}

#[test]
fn retried_load_after_failed_save_does_not_duplicate_quarantine() {
    let rows = vec![
        row(1, "Good", Some((2024, 1))),
        RawNoteRow::new(2)
            .with(Column::Id, "2")
            .with(Column::Subject, "Stranger")
            .with(Column::Assignee, "Maria"),
    ];
    let mut store = NoteStore::new(
        InMemoryNoteStorage::with_rows(rows),
        FixedClock(at(2024)),
        IdRepairPolicy::Reassign,
        AdminGate::new(SECRET),
    );

    store.storage_mut().set_fail_saves(true);
    assert!(matches!(store.load(), Err(StoreError::Storage(_))));
    assert_eq!(store.storage().quarantined().len(), 1);

    store.storage_mut().set_fail_saves(false);
    store.load().unwrap();
    assert_eq!(store.storage().quarantined().len(), 1);
    assert_eq!(store.storage().rows().unwrap().len(), 1);
    assert_eq!(store.records().len(), 1);
}

fn row(position: u64, subject: &str, serial: Option<(i32, u32)>) -> RawNoteRow {
    let status = if serial.is_some() { "under_review" } else { "drafting" };
    let mut raw = RawNoteRow::new(position)
        .with(Column::Id, position.to_string())
        .with(Column::Subject, subject)
        .with(Column::Assignee, "Nadya")
        .with(Column::Status, status)
        .with(Column::CreatedAt, "2024-01-05 10:00:00");
    if let Some((year, sequence)) = serial {
        raw = raw
            .with(Column::Year, year.to_string())
            .with(Column::Sequence, sequence.to_string());
    }
    raw
}

trait WithId {
    fn with_id(self, id: &str) -> RawNoteRow;
}

impl WithId for RawNoteRow {
    /// Replaces the id cell, which `with` would otherwise keep.
    fn with_id(self, id: &str) -> RawNoteRow {
        let mut fresh = RawNoteRow::new(self.position).with(Column::Id, id);
        for column in Column::ALL.into_iter().filter(|column| *column != Column::Id) {
            if let Some(value) = self.get(column) {
                fresh.set(column, value);
            }
        }
        fresh
    }
}
