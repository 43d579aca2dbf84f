//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate storage calls into note registration, editing and admin APIs.
//! - Own serial number generation.
//! - Keep presentation layers decoupled from storage details.

pub mod note_store;
pub mod numbering;
