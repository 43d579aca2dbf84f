//! Note store use-case service.
//!
//! # Responsibility
//! - Own the in-memory ordered note set and its storage backend.
//! - Provide create/update/delete/clear entry points for presentation layers.
//! - Apply serial numbering through `NoteRecord::apply_transition`.
//!
//! # Invariants
//! - Every successful mutation is persisted before returning.
//! - A failed persist restores the previous in-memory set.
//! - Destructive operations require the admin secret and explicit confirmation.
//! - Serial numbers are computed fresh from the current set at numbering time.

use crate::model::note::{
    Collaborator, NoteId, NoteRecord, NoteStatus, NoteValidationError, Published, SerialNumber,
};
use crate::repo::normalize::{normalize_rows, IdRepairPolicy, LoadReport};
use crate::repo::storage::{NoteStorage, StorageError};
use crate::service::numbering::{next_serial, Clock, SystemClock};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::time::Instant;

pub type StoreResult<T> = Result<T, StoreError>;

/// Why a destructive operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationFailure {
    WrongCredential,
    NotConfirmed,
}

impl Display for AuthorizationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongCredential => write!(f, "incorrect admin password"),
            Self::NotConfirmed => write!(f, "the operation was not confirmed"),
        }
    }
}

/// Error returned by store operations.
#[derive(Debug)]
pub enum StoreError {
    Validation(NoteValidationError),
    NotFound(NoteId),
    Authorization(AuthorizationFailure),
    Storage(StorageError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::Authorization(failure) => write!(f, "action denied: {failure}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::NotFound(_) | Self::Authorization(_) => None,
        }
    }
}

impl From<NoteValidationError> for StoreError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StorageError> for StoreError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<AuthorizationFailure> for StoreError {
    fn from(value: AuthorizationFailure) -> Self {
        Self::Authorization(value)
    }
}

/// Shared static credential guarding destructive operations.
#[derive(Clone)]
pub struct AdminGate {
    secret: String,
}

impl AdminGate {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Exact string comparison plus explicit confirmation.
    pub fn authorize(&self, credential: &str, confirmed: bool) -> Result<(), AuthorizationFailure> {
        if credential != self.secret {
            return Err(AuthorizationFailure::WrongCredential);
        }
        if !confirmed {
            return Err(AuthorizationFailure::NotConfirmed);
        }
        Ok(())
    }
}

impl Debug for AdminGate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminGate").finish_non_exhaustive()
    }
}

/// Registration request for a new note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub subject: String,
    pub external_process_ref: Option<String>,
    pub assignee: Collaborator,
    /// Only `Drafting` or `UnderReview` are accepted at registration.
    pub status: NoteStatus,
    pub requires_initial_number: bool,
}

impl NewNote {
    pub fn new(subject: impl Into<String>, assignee: Collaborator, status: NoteStatus) -> Self {
        Self {
            subject: subject.into(),
            external_process_ref: None,
            assignee,
            status,
            requires_initial_number: false,
        }
    }

    pub fn with_external_ref(mut self, reference: impl Into<String>) -> Self {
        self.external_process_ref = Some(reference.into());
        self
    }

    pub fn requiring_initial_number(mut self, required: bool) -> Self {
        self.requires_initial_number = required;
        self
    }
}

/// Full edit of an existing note's editable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEdit {
    pub subject: String,
    pub external_process_ref: Option<String>,
    pub requires_initial_number: bool,
    pub status: NoteStatus,
    /// Applied only when `status == Concluded`; otherwise the stored answer is kept.
    pub published: Option<Published>,
}

impl NoteEdit {
    /// Edit pre-filled with the record's current values.
    pub fn from_record(record: &NoteRecord) -> Self {
        Self {
            subject: record.subject.clone(),
            external_process_ref: record.external_process_ref.clone(),
            requires_initial_number: record.requires_initial_number,
            status: record.status,
            published: record.published,
        }
    }
}

/// Single-writer note repository with full-rewrite persistence.
pub struct NoteStore<S: NoteStorage, C: Clock = SystemClock> {
    storage: S,
    clock: C,
    policy: IdRepairPolicy,
    admin: AdminGate,
    records: Vec<NoteRecord>,
    last_report: LoadReport,
}

impl<S: NoteStorage, C: Clock> NoteStore<S, C> {
    /// Creates an unloaded store. Call `load` before use, or use `open`.
    pub fn new(storage: S, clock: C, policy: IdRepairPolicy, admin: AdminGate) -> Self {
        Self {
            storage,
            clock,
            policy,
            admin,
            records: Vec::new(),
            last_report: LoadReport::default(),
        }
    }

    /// Creates a store and loads it from `storage`.
    pub fn open(storage: S, clock: C, policy: IdRepairPolicy, admin: AdminGate) -> StoreResult<Self> {
        let mut store = Self::new(storage, clock, policy, admin);
        store.load()?;
        Ok(store)
    }

    /// Reads and normalizes every persisted row, replacing in-memory state.
    ///
    /// Absent storage is initialized empty. Repairs (dropped, re-identified
    /// or quarantined rows) are written back immediately. Quarantined rows are
    /// archived before the cleaned table is saved; archiving skips rows that
    /// are already archived, so a retried load does not duplicate them.
    pub fn load(&mut self) -> StoreResult<&LoadReport> {
        let started_at = Instant::now();
        let location = self.storage.describe();

        let Some(rows) = self.storage.load_rows()? else {
            self.storage.initialize()?;
            self.records.clear();
            self.last_report = LoadReport::default();
            info!(
                "event=store_load module=service status=initialized storage={}",
                location
            );
            return Ok(&self.last_report);
        };

        let (records, report) = normalize_rows(rows, self.policy, self.clock.now());
        if report.repaired() {
            self.storage.archive_quarantined(&report.quarantined)?;
            self.storage.save_records(&records)?;
            warn!(
                "event=store_load module=service status=repaired storage={} dropped={} reassigned={} renumbered_all={} quarantined={}",
                location,
                report.dropped_blank,
                report.reassigned_ids.len(),
                report.renumbered_all,
                report.quarantined.len()
            );
        }

        self.records = records;
        self.last_report = report;
        info!(
            "event=store_load module=service status=ok storage={} records={} duration_ms={}",
            location,
            self.records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(&self.last_report)
    }

    /// Records in storage order.
    pub fn records(&self) -> &[NoteRecord] {
        &self.records
    }

    pub fn get(&self, id: NoteId) -> Option<&NoteRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn last_load_report(&self) -> &LoadReport {
        &self.last_report
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// `max(id) + 1` over live records and ids held by quarantined rows,
    /// `1` when there are none.
    pub fn next_id(&self) -> NoteId {
        let reserved = self.last_report.highest_quarantined_id.unwrap_or(0);
        self.records
            .iter()
            .map(|record| record.id)
            .fold(reserved, NoteId::max)
            + 1
    }

    /// Serial number the next numbered note would receive right now.
    pub fn preview_next_serial(&self) -> StoreResult<SerialNumber> {
        next_serial(&self.records, self.clock.now()).map_err(StoreError::from)
    }

    /// Records ordered for display: year desc, sequence desc, id desc,
    /// with unnumbered notes after numbered ones.
    pub fn sorted_for_display(&self) -> Vec<&NoteRecord> {
        let mut sorted: Vec<&NoteRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| b.serial.cmp(&a.serial).then_with(|| b.id.cmp(&a.id)));
        sorted
    }

    /// Registers a new note and returns its id.
    pub fn create(&mut self, new_note: NewNote) -> StoreResult<NoteId> {
        let subject = new_note.subject.trim();
        if subject.is_empty() {
            return Err(NoteValidationError::EmptySubject.into());
        }
        if new_note.status == NoteStatus::Concluded {
            return Err(NoteValidationError::InvalidInitialStatus(new_note.status).into());
        }

        let now = self.clock.now();
        let id = self.next_id();
        let mut record = NoteRecord::new(id, subject, new_note.assignee, NoteStatus::Drafting, now);
        record.external_process_ref = normalize_reference(new_note.external_process_ref);
        let record = record.apply_transition(
            new_note.status,
            new_note.requires_initial_number,
            now,
            || next_serial(&self.records, now),
        )?;
        record.validate()?;

        let snapshot = self.records.clone();
        let serial = record.formatted_number();
        self.records.push(record);
        self.commit(snapshot)?;

        info!(
            "event=note_create module=service status=ok id={} serial={}",
            id,
            serial.as_deref().unwrap_or("-")
        );
        Ok(id)
    }

    /// Applies an edit to an existing note and returns the updated record.
    pub fn update(&mut self, id: NoteId, edit: NoteEdit) -> StoreResult<NoteRecord> {
        let index = self
            .records
            .iter()
            .position(|record| record.id == id)
            .ok_or(StoreError::NotFound(id))?;

        let subject = edit.subject.trim();
        if subject.is_empty() {
            return Err(NoteValidationError::EmptySubject.into());
        }

        let now = self.clock.now();
        let mut updated = self.records[index].clone();
        let was_numbered = updated.is_numbered();
        updated.subject = subject.to_string();
        updated.external_process_ref = normalize_reference(edit.external_process_ref);
        if edit.status == NoteStatus::Concluded && edit.published.is_some() {
            updated.published = edit.published;
        }
        let updated = updated.apply_transition(
            edit.status,
            edit.requires_initial_number,
            now,
            || next_serial(&self.records, now),
        )?;
        updated.validate()?;

        let snapshot = self.records.clone();
        self.records[index] = updated.clone();
        self.commit(snapshot)?;

        info!(
            "event=note_update module=service status=ok id={} numbered_now={}",
            id,
            !was_numbered && updated.is_numbered()
        );
        Ok(updated)
    }

    /// Removes one note. Returns whether a record was removed.
    ///
    /// An unknown id is a no-op once authorization succeeds.
    pub fn delete(&mut self, id: NoteId, credential: &str, confirmed: bool) -> StoreResult<bool> {
        self.authorize("note_delete", credential, confirmed)?;

        let Some(index) = self.records.iter().position(|record| record.id == id) else {
            info!(
                "event=note_delete module=service status=noop id={}",
                id
            );
            return Ok(false);
        };

        let snapshot = self.records.clone();
        self.records.remove(index);
        self.commit(snapshot)?;

        info!("event=note_delete module=service status=ok id={}", id);
        Ok(true)
    }

    /// Empties the store. Returns the number of removed records.
    pub fn clear(&mut self, credential: &str, confirmed: bool) -> StoreResult<usize> {
        self.authorize("store_clear", credential, confirmed)?;

        let snapshot = std::mem::take(&mut self.records);
        let removed = snapshot.len();
        self.commit(snapshot)?;

        info!(
            "event=store_clear module=service status=ok removed={}",
            removed
        );
        Ok(removed)
    }

    /// Writes the full in-memory set to storage.
    pub fn persist(&mut self) -> StoreResult<()> {
        self.storage.save_records(&self.records).map_err(|err| {
            error!(
                "event=store_persist module=service status=error storage={} error={}",
                self.storage.describe(),
                err
            );
            StoreError::from(err)
        })
    }

    fn commit(&mut self, snapshot: Vec<NoteRecord>) -> StoreResult<()> {
        if let Err(err) = self.persist() {
            self.records = snapshot;
            return Err(err);
        }
        Ok(())
    }

    fn authorize(&self, event: &str, credential: &str, confirmed: bool) -> StoreResult<()> {
        self.admin
            .authorize(credential, confirmed)
            .map_err(|failure| {
                warn!(
                    "event={} module=service status=denied reason={:?}",
                    event, failure
                );
                StoreError::Authorization(failure)
            })
    }
}

fn normalize_reference(reference: Option<String>) -> Option<String> {
    reference
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
