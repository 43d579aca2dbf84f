//! Persistence layer for the note table.
//!
//! # Responsibility
//! - Define the storage contract and the fixed tabular schema.
//! - Provide CSV, SQLite and in-memory backends.
//! - Repair persisted rows on load before they reach the store service.
//!
//! # Invariants
//! - Backends only move untyped cells; `normalize` owns interpretation.
//! - Every backend replaces the full table atomically on save.

pub mod csv_storage;
pub mod memory_storage;
pub mod normalize;
pub mod sqlite_storage;
pub mod storage;
