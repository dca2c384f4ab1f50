//! Dataset CSV reading and writing
//!
//! Written files have a header of the sorted union of field names and are
//! replaced atomically, so a reader never sees a truncated file.

use crate::output::dataset::Dataset;
use crate::output::{OutputError, OutputResult};
use crate::DataRecord;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Read records from a dataset CSV
///
/// Empty cells are kept as empty fields, so every column of the file
/// survives a reload.
pub fn read_records(path: &Path) -> OutputResult<Vec<DataRecord>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| OutputError::CsvError(format!("Failed to open {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| OutputError::CsvError(format!("Failed to read header: {e}")))?
        .clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| OutputError::CsvError(format!("Failed to read row: {e}")))?;
        let record: DataRecord = headers
            .iter()
            .zip(row.iter())
            .map(|(field, value)| (field.to_string(), value.to_string()))
            .collect();
        records.push(record);
    }

    debug!(path = %path.display(), records = records.len(), "Read dataset CSV");
    Ok(records)
}

/// Write the dataset to `path` atomically
pub fn write_dataset(path: &Path, dataset: &Dataset) -> OutputResult<()> {
    let header: Vec<&str> = dataset.field_names().into_iter().collect();

    persist_csv(path, |writer| {
        if !header.is_empty() {
            writer
                .write_record(&header)
                .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
        }
        for record in dataset.records() {
            writer
                .write_record(header.iter().map(|field| record.get(field).unwrap_or_default()))
                .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
        }
        Ok(())
    })?;

    info!(
        path = %path.display(),
        records = dataset.len(),
        columns = header.len(),
        "Dataset written"
    );
    Ok(())
}

/// Write rows under an explicit header, atomically
pub(crate) fn write_rows<'a, I>(path: &Path, header: &[String], rows: I) -> OutputResult<()>
where
    I: IntoIterator<Item = Vec<&'a str>>,
{
    persist_csv(path, |writer| {
        writer
            .write_record(header)
            .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
        for row in rows {
            writer
                .write_record(&row)
                .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
        }
        Ok(())
    })
}

type CsvFileWriter<'f> = ::csv::Writer<BufWriter<&'f mut File>>;

/// Write through a temp file in the target directory, then rename over `path`
fn persist_csv<F>(path: &Path, write: F) -> OutputResult<()>
where
    F: FnOnce(&mut CsvFileWriter<'_>) -> OutputResult<()>,
{
    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir)
        .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;
    {
        let buffered = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, temp_file.as_file_mut());
        let mut writer = ::csv::Writer::from_writer(buffered);
        write(&mut writer)?;
        writer
            .flush()
            .map_err(|e| OutputError::IoError(format!("Failed to flush: {e}")))?;
    }
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| OutputError::IoError(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| OutputError::IoError(format!("Failed to persist temp file: {e}")))?;
    Ok(())
}
