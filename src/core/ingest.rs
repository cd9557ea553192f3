//! Normalization of raw sales uploads.
//!
//! Uploads are semicolon-delimited with locale-formatted quantities
//! (`"10,0"`) and postal codes that may carry quotes, hyphens or spaces.
//! Rows are aggregated per postal code before anything is geocoded.

use crate::config::toml_config::{InputConfig, InvalidRowPolicy};
use crate::domain::model::PostalRecord;
use crate::utils::error::{EtlError, Result};
use csv::ReaderBuilder;
use std::collections::BTreeMap;

pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .replace('"', "")
        .trim()
        .to_lowercase()
}

pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '"' | '\'' | '-') && !c.is_whitespace())
        .collect()
}

/// `" 1.5 "`, `"10,0"` and `10` all parse; anything else is `None`.
pub fn parse_quantity(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '"' && !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok().filter(|q| q.is_finite())
}

fn column_index(headers: &[String], name: &str) -> Result<usize> {
    let wanted = normalize_header(name);
    headers
        .iter()
        .position(|h| *h == wanted)
        .ok_or(EtlError::MissingColumnError { column: wanted })
}

/// Parses an upload into one record per postal code, sorted by code, with
/// quantities summed across duplicate rows.
pub fn parse_sales_csv(data: &[u8], config: &InputConfig) -> Result<Vec<PostalRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(config.delimiter_byte()?)
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    let code_idx = column_index(&headers, &config.code_column)?;
    let quantity_idx = column_index(&headers, &config.quantity_column)?;

    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    let mut skipped = 0usize;

    for (i, row) in reader.records().enumerate() {
        let row_number = i + 1;
        let row = row?;
        let raw_code = row.get(code_idx).unwrap_or_default();
        let raw_quantity = row.get(quantity_idx).unwrap_or_default();

        match parse_row(row_number, raw_code, raw_quantity, config) {
            Ok((code, quantity)) => *totals.entry(code).or_insert(0.0) += quantity,
            Err(e) => match config.on_invalid_row {
                InvalidRowPolicy::Reject => return Err(e),
                InvalidRowPolicy::Skip => {
                    tracing::warn!("Skipping input row: {}", e);
                    skipped += 1;
                }
            },
        }
    }

    if skipped > 0 {
        tracing::warn!("{} invalid rows skipped", skipped);
    }
    tracing::debug!("Aggregated input into {} postal codes", totals.len());

    Ok(totals
        .into_iter()
        .map(|(code, quantity)| PostalRecord::new(code, quantity))
        .collect())
}

fn parse_row(
    row: usize,
    raw_code: &str,
    raw_quantity: &str,
    config: &InputConfig,
) -> Result<(String, f64)> {
    let code = normalize_code(raw_code);
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(EtlError::InputParseError {
            row,
            field: config.code_column.clone(),
            value: raw_code.to_string(),
            reason: "postal code must contain only digits".to_string(),
        });
    }

    let quantity = parse_quantity(raw_quantity).ok_or_else(|| EtlError::InputParseError {
        row,
        field: config.quantity_column.clone(),
        value: raw_quantity.to_string(),
        reason: "not a decimal number".to_string(),
    })?;

    Ok((code, quantity))
}
