//! Raw-to-flat CSV repair
//!
//! Older exports stored the whole API response in a single
//! `labour_force_statistics` cell per row. Repair expands those cells into one
//! CSV row per record, using the first record's field order as the header.

use crate::output::csv::write_rows;
use crate::output::{OutputError, OutputResult};
use crate::DataRecord;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Column holding the embedded record list
pub const RAW_COLUMN: &str = "labour_force_statistics";

/// Suffix appended to the input file stem for the repaired output
pub const REPAIRED_SUFFIX: &str = "_FIXED";

/// Result of a repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairSummary {
    /// Written file
    pub output: PathBuf,
    /// Number of records written
    pub records: usize,
    /// Header fields, in output order
    pub fields: Vec<String>,
    /// Observation month of the first record
    pub first_month: Option<String>,
    /// Observation month of the last record
    pub last_month: Option<String>,
}

/// Default output path: `<input stem>_FIXED.csv` next to the input
pub fn repaired_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{REPAIRED_SUFFIX}.csv"))
}

/// Expand the embedded record lists of `input` into a flat CSV
pub fn repair_raw_csv(input: &Path, output: Option<&Path>) -> OutputResult<RepairSummary> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| repaired_path(input));

    let mut reader = ::csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(input)
        .map_err(|e| OutputError::CsvError(format!("Failed to open {}: {e}", input.display())))?;
    let column = reader
        .headers()
        .map_err(|e| OutputError::CsvError(format!("Failed to read header: {e}")))?
        .iter()
        .position(|h| h == RAW_COLUMN)
        .ok_or_else(|| OutputError::CsvError(format!("missing column '{RAW_COLUMN}'")))?;

    let mut objects: Vec<Map<String, Value>> = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| OutputError::CsvError(format!("Failed to read row: {e}")))?;
        let cell = row.get(column).unwrap_or_default().trim();
        if cell.is_empty() {
            debug!(row = line + 1, "Empty {RAW_COLUMN} cell skipped");
            continue;
        }
        objects.extend(parse_embedded_records(cell)?);
    }

    let Some(first) = objects.first() else {
        return Err(OutputError::NoRecords(input.display().to_string()));
    };
    let fields: Vec<String> = first.keys().cloned().collect();

    let records: Vec<DataRecord> = objects.iter().map(DataRecord::from_json_object).collect();
    write_rows(
        &output,
        &fields,
        records.iter().map(|record| {
            fields
                .iter()
                .map(|field| record.get(field).unwrap_or_default())
                .collect()
        }),
    )?;

    let summary = RepairSummary {
        output,
        records: records.len(),
        first_month: records
            .first()
            .and_then(DataRecord::observation_month)
            .map(str::to_string),
        last_month: records
            .last()
            .and_then(DataRecord::observation_month)
            .map(str::to_string),
        fields,
    };
    info!(
        input = %input.display(),
        output = %summary.output.display(),
        records = summary.records,
        "Repaired raw CSV"
    );
    Ok(summary)
}

/// Parse one embedded cell: JSON, or the Python literal form older exports used
fn parse_embedded_records(cell: &str) -> OutputResult<Vec<Map<String, Value>>> {
    let value: Value = match serde_json::from_str(cell) {
        Ok(value) => value,
        Err(_) => serde_json::from_str(&python_literal_to_json(cell))
            .map_err(|e| OutputError::ParseError(format!("Invalid record list: {e}")))?,
    };

    match value {
        Value::Array(entries) => Ok(entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(object) => Some(object),
                _ => None,
            })
            .collect()),
        other => Err(OutputError::ParseError(format!(
            "expected a list of records, found {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Rewrite a Python literal (single quotes, None/True/False) as JSON text
fn python_literal_to_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push('"');
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(escaped) => {
                                out.push('\\');
                                out.push(escaped);
                            }
                            None => out.push_str("\\\\"),
                        },
                        c if c == quote => break,
                        '"' => out.push_str("\\\""),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "None" => "null",
                    "True" => "true",
                    "False" => "false",
                    other => other,
                });
            }
            c => out.push(c),
        }
    }
    out
}
