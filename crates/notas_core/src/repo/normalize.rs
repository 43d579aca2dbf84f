//! Load-time repair of persisted rows.
//!
//! # Responsibility
//! - Coerce raw cells into typed `NoteRecord`s.
//! - Repair ids according to `IdRepairPolicy`.
//! - Quarantine rows that cannot be repaired without breaking numbering.
//!
//! # Invariants
//! - Rows with a blank subject are dropped.
//! - Valid ids are kept as-is under `IdRepairPolicy::Reassign`.
//! - A row with only one of `year`/`sequence` never enters the live set.
//! - Stored `role` and `formattedNumber` cells are never trusted.

use crate::model::note::{
    Collaborator, NoteId, NoteRecord, NoteStatus, Published, SerialNumber,
};
use crate::repo::storage::{Column, RawNoteRow, LEGACY_TIMESTAMP_FORMAT, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

/// How to repair missing, unparsable or duplicate ids on load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdRepairPolicy {
    /// Only the broken rows get fresh ids after the current maximum.
    #[default]
    Reassign,
    /// Any broken id renumbers every row densely `1..N` in file order.
    RenumberAll,
}

/// Why a row was pulled out of the live set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineReason {
    UnknownAssignee(Option<String>),
    PartialSerial,
    InvalidSerial,
}

impl Display for QuarantineReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAssignee(Some(name)) => write!(f, "unknown assignee `{name}`"),
            Self::UnknownAssignee(None) => write!(f, "missing assignee"),
            Self::PartialSerial => write!(f, "year and sequence must be set together"),
            Self::InvalidSerial => write!(f, "year or sequence out of range"),
        }
    }
}

/// A refused row together with the reason it was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedRow {
    pub row: RawNoteRow,
    pub reason: QuarantineReason,
}

/// Summary of what normalization changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub dropped_blank: usize,
    /// `(row position, new id)` for every row that received a fresh id.
    pub reassigned_ids: Vec<(u64, NoteId)>,
    pub renumbered_all: bool,
    pub quarantined: Vec<QuarantinedRow>,
    /// Largest valid id among quarantined rows. Those ids stay reserved.
    pub highest_quarantined_id: Option<NoteId>,
}

impl LoadReport {
    /// Whether loading changed anything that should be written back.
    pub fn repaired(&self) -> bool {
        self.dropped_blank > 0
            || !self.reassigned_ids.is_empty()
            || self.renumbered_all
            || !self.quarantined.is_empty()
    }
}

/// Converts raw rows into records, repairing what can be repaired.
///
/// `now` stands in for an unparsable creation timestamp.
pub fn normalize_rows(
    rows: Vec<RawNoteRow>,
    policy: IdRepairPolicy,
    now: NaiveDateTime,
) -> (Vec<NoteRecord>, LoadReport) {
    let mut report = LoadReport::default();
    let mut parsed: Vec<(u64, Option<NoteId>, NoteRecord)> = Vec::with_capacity(rows.len());
    let mut highest_id: NoteId = 0;

    for row in rows {
        if row.get(Column::Subject).map_or(true, |s| s.trim().is_empty()) {
            debug!(
                "event=row_normalize module=repo status=dropped row={} reason=blank_subject",
                row.position
            );
            report.dropped_blank += 1;
            continue;
        }

        let id = row.get(Column::Id).and_then(parse_id);
        match parse_record(&row, now) {
            Ok(record) => parsed.push((row.position, id, record)),
            Err(reason) => {
                warn!(
                    "event=row_normalize module=repo status=quarantined row={} reason=\"{}\"",
                    row.position, reason
                );
                if let Some(id) = id {
                    highest_id = highest_id.max(id);
                    report.highest_quarantined_id =
                        Some(report.highest_quarantined_id.map_or(id, |seen| seen.max(id)));
                }
                report.quarantined.push(QuarantinedRow { row, reason });
            }
        }
    }

    let mut seen = HashSet::new();
    let broken: Vec<bool> = parsed
        .iter()
        .map(|(_, id, _)| match id {
            Some(id) => !seen.insert(*id),
            None => true,
        })
        .collect();
    highest_id = parsed
        .iter()
        .filter_map(|(_, id, _)| *id)
        .fold(highest_id, NoteId::max);

    let renumber_all = policy == IdRepairPolicy::RenumberAll && broken.iter().any(|b| *b);
    if renumber_all {
        warn!(
            "event=id_repair module=repo status=renumbered_all rows={}",
            parsed.len()
        );
        report.renumbered_all = true;
    }

    let mut records = Vec::with_capacity(parsed.len());
    let mut next_fresh = highest_id;
    for (index, ((position, id, mut record), is_broken)) in
        parsed.into_iter().zip(broken).enumerate()
    {
        record.id = if renumber_all {
            index as NoteId + 1
        } else if let (Some(id), false) = (id, is_broken) {
            id
        } else {
            next_fresh += 1;
            warn!(
                "event=id_repair module=repo status=reassigned row={} new_id={}",
                position, next_fresh
            );
            report.reassigned_ids.push((position, next_fresh));
            next_fresh
        };
        records.push(record);
    }

    report.loaded = records.len();
    (records, report)
}

fn parse_record(row: &RawNoteRow, now: NaiveDateTime) -> Result<NoteRecord, QuarantineReason> {
    let assignee_cell = row.get(Column::Assignee);
    let assignee = assignee_cell
        .and_then(Collaborator::parse)
        .ok_or_else(|| QuarantineReason::UnknownAssignee(assignee_cell.map(str::to_string)))?;

    let serial = parse_serial(row)?;

    let status = match row.get(Column::Status) {
        Some(value) => NoteStatus::parse(value).unwrap_or_else(|| {
            warn!(
                "event=row_normalize module=repo status=defaulted row={} field=status",
                row.position
            );
            NoteStatus::Drafting
        }),
        None => NoteStatus::Drafting,
    };

    let created_at = row
        .get(Column::CreatedAt)
        .and_then(parse_timestamp)
        .unwrap_or_else(|| {
            warn!(
                "event=row_normalize module=repo status=defaulted row={} field=created_at",
                row.position
            );
            now
        });

    let record = NoteRecord {
        id: 0,
        subject: row
            .get(Column::Subject)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        external_process_ref: row
            .get(Column::ExternalProcessRef)
            .map(|s| s.trim().to_string()),
        requires_initial_number: row
            .get(Column::RequiresInitialNumber)
            .and_then(parse_bool)
            .unwrap_or(false),
        serial,
        assignee,
        status,
        created_at,
        reviewed_at: row.get(Column::ReviewedAt).and_then(parse_timestamp),
        published: row.get(Column::Published).and_then(Published::parse),
    };

    if row.get(Column::Role) != Some(record.role().label()) {
        debug!(
            "event=row_normalize module=repo status=recomputed row={} field=role",
            row.position
        );
    }
    if row.get(Column::FormattedNumber).map(str::to_string) != record.formatted_number() {
        debug!(
            "event=row_normalize module=repo status=recomputed row={} field=formatted_number",
            row.position
        );
    }
    if record.status == NoteStatus::Concluded && record.published.is_none() {
        debug!(
            "event=row_normalize module=repo status=kept row={} reason=concluded_without_published",
            row.position
        );
    }

    Ok(record)
}

fn parse_serial(row: &RawNoteRow) -> Result<Option<SerialNumber>, QuarantineReason> {
    let year = row.get(Column::Year).and_then(parse_integer);
    let sequence = row.get(Column::Sequence).and_then(parse_integer);
    match (year, sequence) {
        (None, None) => Ok(None),
        (Some(year), Some(sequence)) => {
            let year = i32::try_from(year).map_err(|_| QuarantineReason::InvalidSerial)?;
            let sequence = u32::try_from(sequence)
                .ok()
                .filter(|sequence| *sequence > 0)
                .ok_or(QuarantineReason::InvalidSerial)?;
            let serial = SerialNumber::new(year, sequence);
            // A serial without successor would stall numbering for its year.
            serial
                .successor()
                .map(|_| Some(serial))
                .ok_or(QuarantineReason::InvalidSerial)
        }
        _ => Err(QuarantineReason::PartialSerial),
    }
}

fn parse_id(value: &str) -> Option<NoteId> {
    parse_integer(value)
        .and_then(|id| NoteId::try_from(id).ok())
        .filter(|id| *id > 0)
}

/// Parses integer text, also accepting integral floats such as `"3.0"`.
pub fn parse_integer(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Some(parsed);
    }
    let float = trimmed.parse::<f64>().ok()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "1.0" | "yes" | "sim" => Some(true),
        "false" | "0" | "0.0" | "no" | "não" | "nao" => Some(false),
        _ => None,
    }
}

/// Parses the canonical timestamp format and the legacy `dd/mm/yyyy HH:MM`.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, LEGACY_TIMESTAMP_FORMAT))
        .ok()
}
