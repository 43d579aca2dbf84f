//! Domain model for technical notes.
//!
//! # Responsibility
//! - Define the note record, its lifecycle enums and the collaborator roster.
//! - Keep the serial-number transition guard independent of storage and UI.
//!
//! # Invariants
//! - Every note is identified by a dense integer `NoteId`.
//! - A serial number is assigned at most once per note.

pub mod note;
