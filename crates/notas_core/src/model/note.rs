//! Technical note domain model.
//!
//! # Responsibility
//! - Define the canonical record tracked through drafting, review and conclusion.
//! - Own the numbering transition guard (`NoteRecord::apply_transition`).
//!
//! # Invariants
//! - `id` is unique within a store and never reused.
//! - `serial` is either fully set or absent; once set it never changes.
//! - `role()` and `formatted_number()` are derived, never stored as truth.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Dense integer identifier assigned by the store.
pub type NoteId = u64;

/// Lifecycle state of a technical note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    /// Being written; no serial number required yet.
    Drafting,
    /// Submitted for review; entering this state assigns a serial number.
    UnderReview,
    /// Finished; requires a `published` answer.
    Concluded,
}

impl NoteStatus {
    pub const ALL: [NoteStatus; 3] = [Self::Drafting, Self::UnderReview, Self::Concluded];

    /// Canonical persisted token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drafting => "drafting",
            Self::UnderReview => "under_review",
            Self::Concluded => "concluded",
        }
    }

    /// Human-readable label used by presentation layers.
    pub fn label(self) -> &'static str {
        match self {
            Self::Drafting => "Drafting",
            Self::UnderReview => "Under review",
            Self::Concluded => "Concluded",
        }
    }

    /// Parses canonical tokens and the legacy spreadsheet labels.
    pub fn parse(value: &str) -> Option<Self> {
        match fold(value).as_str() {
            "drafting" | "em elaboracao" => Some(Self::Drafting),
            "under_review" | "under review" | "underreview" | "em analise" => {
                Some(Self::UnderReview)
            }
            "concluded" | "concluido" => Some(Self::Concluded),
            _ => None,
        }
    }
}

impl Display for NoteStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Answer to "was the concluded note published?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Published {
    Yes,
    No,
}

impl Published {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match fold(value).as_str() {
            "yes" | "sim" | "true" => Some(Self::Yes),
            "no" | "nao" | "false" => Some(Self::No),
            _ => None,
        }
    }
}

impl Display for Published {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Yes => "Yes",
            Self::No => "No",
        })
    }
}

/// Job title derived from the assignee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    Engineer,
    AdministrativeAnalyst,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::Engineer => "Engineer",
            Self::AdministrativeAnalyst => "Administrative Analyst",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed team of collaborators a note can be assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collaborator {
    Andrei,
    Arthur,
    Carla,
    #[serde(rename = "José")]
    Jose,
    Lucas,
    Nadya,
    Pedro,
    Uiter,
    Yan,
}

impl Collaborator {
    /// All collaborators in roster order.
    pub const ALL: [Collaborator; 9] = [
        Self::Andrei,
        Self::Arthur,
        Self::Carla,
        Self::Jose,
        Self::Lucas,
        Self::Nadya,
        Self::Pedro,
        Self::Uiter,
        Self::Yan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Andrei => "Andrei",
            Self::Arthur => "Arthur",
            Self::Carla => "Carla",
            Self::Jose => "José",
            Self::Lucas => "Lucas",
            Self::Nadya => "Nadya",
            Self::Pedro => "Pedro",
            Self::Uiter => "Uiter",
            Self::Yan => "Yan",
        }
    }

    /// Static assignee -> role lookup.
    pub fn role(self) -> Role {
        match self {
            Self::Andrei | Self::Arthur => Role::Administrator,
            Self::Jose => Role::AdministrativeAnalyst,
            Self::Carla | Self::Lucas | Self::Nadya | Self::Pedro | Self::Uiter | Self::Yan => {
                Role::Engineer
            }
        }
    }

    /// Case-insensitive lookup by display name (accent optional).
    pub fn parse(value: &str) -> Option<Self> {
        let folded = fold(value);
        Self::ALL
            .into_iter()
            .find(|collaborator| fold(collaborator.name()) == folded)
    }
}

impl Display for Collaborator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collaborator {
    type Err = NoteValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| NoteValidationError::UnknownCollaborator(s.to_string()))
    }
}

/// Year-scoped serial number, displayed as `SSSS/YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SerialNumber {
    pub year: i32,
    pub sequence: u32,
}

impl SerialNumber {
    pub fn new(year: i32, sequence: u32) -> Self {
        Self { year, sequence }
    }

    /// Next serial in the same year, or `None` once the year's sequence
    /// space is used up.
    pub fn successor(self) -> Option<Self> {
        self.sequence
            .checked_add(1)
            .map(|sequence| Self::new(self.year, sequence))
    }

    /// Display form, zero-padded to four digits.
    pub fn formatted(&self) -> String {
        format!("{:04}/{}", self.sequence, self.year)
    }
}

impl Display for SerialNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}/{}", self.sequence, self.year)
    }
}

/// Validation errors for note records and inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    EmptySubject,
    MissingPublishedAnswer,
    UnknownCollaborator(String),
    InvalidInitialStatus(NoteStatus),
    SequenceExhausted(i32),
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySubject => write!(f, "subject is required"),
            Self::MissingPublishedAnswer => {
                write!(f, "concluded notes require a published answer")
            }
            Self::UnknownCollaborator(name) => write!(f, "unknown collaborator `{name}`"),
            Self::InvalidInitialStatus(status) => {
                write!(f, "notes cannot be registered with status `{status}`")
            }
            Self::SequenceExhausted(year) => {
                write!(f, "no serial numbers left for {year}")
            }
        }
    }
}

impl Error for NoteValidationError {}

/// One tracked technical note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: NoteId,
    pub subject: String,
    /// Opaque SEI process reference, free-form.
    pub external_process_ref: Option<String>,
    pub requires_initial_number: bool,
    pub serial: Option<SerialNumber>,
    pub assignee: Collaborator,
    pub status: NoteStatus,
    pub created_at: NaiveDateTime,
    /// Set when the serial number is first assigned.
    pub reviewed_at: Option<NaiveDateTime>,
    /// Meaningful only when `status == Concluded`.
    pub published: Option<Published>,
}

impl NoteRecord {
    /// Builds an unnumbered record.
    pub fn new(
        id: NoteId,
        subject: impl Into<String>,
        assignee: Collaborator,
        status: NoteStatus,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            subject: subject.into(),
            external_process_ref: None,
            requires_initial_number: false,
            serial: None,
            assignee,
            status,
            created_at,
            reviewed_at: None,
            published: None,
        }
    }

    pub fn role(&self) -> Role {
        self.assignee.role()
    }

    pub fn year(&self) -> Option<i32> {
        self.serial.map(|serial| serial.year)
    }

    pub fn sequence(&self) -> Option<u32> {
        self.serial.map(|serial| serial.sequence)
    }

    /// Always recomputed from `serial`.
    pub fn formatted_number(&self) -> Option<String> {
        self.serial.map(|serial| serial.formatted())
    }

    pub fn is_numbered(&self) -> bool {
        self.serial.is_some()
    }

    /// Whether the record's current state demands a serial number.
    pub fn needs_serial(&self) -> bool {
        self.status == NoteStatus::UnderReview || self.requires_initial_number
    }

    /// Checks invariants that must hold before a record is written.
    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.subject.trim().is_empty() {
            return Err(NoteValidationError::EmptySubject);
        }
        if self.status == NoteStatus::Concluded && self.published.is_none() {
            return Err(NoteValidationError::MissingPublishedAnswer);
        }
        Ok(())
    }

    /// Applies a status/flag change and assigns a serial number when the
    /// record enters a numbering state for the first time.
    ///
    /// `next_serial` is called at most once, and only for unnumbered records.
    /// Its error is returned as-is and leaves no partial change behind.
    pub fn apply_transition<F>(
        mut self,
        status: NoteStatus,
        requires_initial_number: bool,
        now: NaiveDateTime,
        next_serial: F,
    ) -> Result<Self, NoteValidationError>
    where
        F: FnOnce() -> Result<SerialNumber, NoteValidationError>,
    {
        self.status = status;
        self.requires_initial_number = requires_initial_number;
        if self.serial.is_none() && self.needs_serial() {
            self.serial = Some(next_serial()?);
            self.reviewed_at = Some(now);
        }
        Ok(self)
    }
}

/// Lowercases, trims and strips the Portuguese accents used in legacy labels.
fn fold(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|ch| match ch {
            'á' | 'à' | 'â' | 'ã' | 'Á' | 'À' | 'Â' | 'Ã' => 'a',
            'é' | 'ê' | 'É' | 'Ê' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'ô' | 'õ' | 'Ó' | 'Ô' | 'Õ' => 'o',
            'ú' | 'Ú' => 'u',
            'ç' | 'Ç' => 'c',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}
