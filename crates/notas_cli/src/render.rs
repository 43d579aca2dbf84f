//! Plain-text rendering of note tables for the terminal.

use notas_core::NoteRecord;

const SUBJECT_DISPLAY_WIDTH: usize = 40;
const DISPLAY_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M";
const HEADERS: [&str; 9] = [
    "ID", "NUMBER", "SUBJECT", "SEI", "ASSIGNEE", "ROLE", "STATUS", "REVIEWED", "PUBLISHED",
];

/// Renders records as an aligned table, one row per record, in the given order.
pub fn render_table(records: &[&NoteRecord]) -> String {
    let rows: Vec<[String; 9]> = records.iter().map(|record| table_row(record)).collect();

    let mut widths = HEADERS.map(|header| header.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS.map(str::to_string), &widths);
    for row in &rows {
        push_line(&mut out, row, &widths);
    }
    out
}

/// Renders every field of one record as aligned label/value lines.
pub fn render_detail(record: &NoteRecord) -> String {
    let fields = [
        ("Id", record.id.to_string()),
        ("Number", optional(record.formatted_number())),
        ("Subject", record.subject.clone()),
        ("SEI", optional(record.external_process_ref.clone())),
        (
            "Requires initial number",
            yes_no(record.requires_initial_number).to_string(),
        ),
        ("Assignee", record.assignee.to_string()),
        ("Role", record.role().to_string()),
        ("Status", record.status.label().to_string()),
        (
            "Created",
            record.created_at.format(DISPLAY_TIMESTAMP_FORMAT).to_string(),
        ),
        (
            "Reviewed",
            optional(
                record
                    .reviewed_at
                    .map(|at| at.format(DISPLAY_TIMESTAMP_FORMAT).to_string()),
            ),
        ),
        (
            "Published",
            optional(record.published.map(|published| published.to_string())),
        ),
    ];

    let label_width = fields
        .iter()
        .map(|(label, _)| label.len())
        .max()
        .unwrap_or_default();
    fields
        .iter()
        .map(|(label, value)| format!("{label:<label_width$}  {value}\n"))
        .collect()
}

fn table_row(record: &NoteRecord) -> [String; 9] {
    [
        record.id.to_string(),
        optional(record.formatted_number()),
        truncate(&record.subject, SUBJECT_DISPLAY_WIDTH),
        optional(record.external_process_ref.clone()),
        record.assignee.to_string(),
        record.role().to_string(),
        record.status.label().to_string(),
        optional(
            record
                .reviewed_at
                .map(|at| at.format(DISPLAY_TIMESTAMP_FORMAT).to_string()),
        ),
        optional(record.published.map(|published| published.to_string())),
    ]
}

fn push_line(out: &mut String, cells: &[String; 9], widths: &[usize; 9]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// Cuts `value` to `max_chars` characters, marking the cut with `...`.
fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
