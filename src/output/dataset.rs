//! Deduplicated record collection
//!
//! The identity index is kept alongside the records, so each merge costs
//! O(batch) rather than rescanning the whole dataset.

use crate::output::csv::read_records;
use crate::output::path::find_latest_dataset;
use crate::output::OutputResult;
use crate::{DataRecord, IdentityKey};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Ordered, identity-deduplicated collection of records
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<DataRecord>,
    index: HashSet<IdentityKey>,
}

impl Dataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from existing records, dropping duplicate identities
    pub fn from_records(records: Vec<DataRecord>) -> Self {
        let mut dataset = Self::new();
        let total = records.len();
        let added = dataset.merge(records);
        if added != total {
            debug!(
                duplicates = total - added,
                "Dropped duplicate records from existing data"
            );
        }
        dataset
    }

    /// Load the most recent dataset file in `output_dir`
    ///
    /// Returns an empty dataset and `None` when there is no previous output.
    pub fn load_latest(output_dir: &Path) -> OutputResult<(Self, Option<PathBuf>)> {
        let Some(path) = find_latest_dataset(output_dir)? else {
            info!(dir = %output_dir.display(), "No existing data files found");
            return Ok((Self::new(), None));
        };

        let records = read_records(&path)?;
        let dataset = Self::from_records(records);
        info!(
            path = %path.display(),
            records = dataset.len(),
            "Loaded existing data"
        );
        Ok((dataset, Some(path)))
    }

    /// Append records whose identity is not yet present; returns the number added
    ///
    /// Duplicates within `new_records` collapse to their first occurrence.
    pub fn merge(&mut self, new_records: Vec<DataRecord>) -> usize {
        self.records.reserve(new_records.len());
        let mut added = 0;
        for record in new_records {
            if self.index.insert(record.identity()) {
                self.records.push(record);
                added += 1;
            }
        }
        added
    }

    /// Whether a record with the same identity is present
    pub fn contains(&self, record: &DataRecord) -> bool {
        self.index.contains(&record.identity())
    }

    /// Get the records in insertion order
    pub fn records(&self) -> &[DataRecord] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted union of field names across all records
    pub fn field_names(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .flat_map(DataRecord::field_names)
            .collect()
    }
}
