//! Year-scoped serial number generator.
//!
//! # Responsibility
//! - Compute the next `SerialNumber` from the current record set.
//! - Provide the clock abstraction used to decide the current year.
//!
//! # Invariants
//! - `next_serial` never mutates its input; the store applies the result.
//! - Within a year, results are strictly increasing as numbered records
//!   join the set between calls.

use crate::model::note::{NoteRecord, NoteValidationError, SerialNumber};
use chrono::{Datelike, Local, NaiveDateTime, Timelike};

/// Source of "now" for numbering and timestamps.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock, truncated to whole seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// Clock pinned to one instant. Used by tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

/// Returns the next serial number for the year of `now`.
///
/// Records numbered in other years are ignored, so every year restarts at 1.
///
/// # Errors
/// - `SequenceExhausted` when the year's highest sequence has no successor.
pub fn next_serial(
    records: &[NoteRecord],
    now: NaiveDateTime,
) -> Result<SerialNumber, NoteValidationError> {
    let current_year = now.year();
    let highest = records
        .iter()
        .filter_map(|record| record.serial)
        .filter(|serial| serial.year == current_year)
        .max();
    match highest {
        None => Ok(SerialNumber::new(current_year, 1)),
        Some(serial) => serial
            .successor()
            .ok_or(NoteValidationError::SequenceExhausted(current_year)),
    }
}
