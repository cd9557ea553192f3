//! The persisted, geocoded dataset: one comma-delimited CSV per upload.

use crate::domain::model::PostalRecord;
use crate::utils::error::{EtlError, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::path::Path;

pub const DATASET_HEADERS: [&str; 9] = [
    "cep",
    "quantidade",
    "lat",
    "lon",
    "state",
    "city",
    "neighborhood",
    "street",
    "service",
];

pub fn read_dataset(data: &[u8]) -> Result<Vec<PostalRecord>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(data);
    let records = reader
        .deserialize::<PostalRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn write_dataset(records: &[PostalRecord]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(DATASET_HEADERS)?;
    for record in records {
        writer.serialize(record)?;
    }

    writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))
}

/// Name of the dataset saved for an uploaded file: `dados_vendas.csv` for `/tmp/vendas.csv`.
pub fn dataset_name_for_upload(prefix: &str, upload: &Path) -> String {
    let file_name = upload
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string());
    format!("{}{}", prefix, file_name)
}

pub fn pending_indices(records: &[PostalRecord]) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.is_resolved())
        .map(|(i, _)| i)
        .collect()
}
