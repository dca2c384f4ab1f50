//! Response body parsing
//!
//! The API has returned three payload shapes over time: a bare JSON array, an
//! object with a `labour_force_statistics` array, and an object with a `data`
//! array. All three are accepted.

use crate::DataRecord;
use serde_json::Value;
use tracing::debug;

/// Key of the record array in the current payload shape
pub const RECORDS_KEY: &str = "labour_force_statistics";

/// Key of the record array in the older payload shape
pub const LEGACY_RECORDS_KEY: &str = "data";

/// Extract the records from a decoded response body
///
/// Unrecognised shapes yield no records. Array entries that are not JSON
/// objects are skipped.
pub fn extract_records(body: Value) -> Vec<DataRecord> {
    let entries = match body {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object
            .remove(RECORDS_KEY)
            .or_else(|| object.remove(LEGACY_RECORDS_KEY))
        {
            Some(Value::Array(entries)) => entries,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    let total = entries.len();
    let records: Vec<DataRecord> = entries
        .iter()
        .filter_map(Value::as_object)
        .map(DataRecord::from_json_object)
        .collect();

    if records.len() != total {
        debug!(
            skipped = total - records.len(),
            "Skipped non-object entries in response"
        );
    }
    records
}
