use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One aggregated sales row keyed by postal code, as persisted to the dataset CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostalRecord {
    #[serde(rename = "cep")]
    pub code: String,
    #[serde(rename = "quantidade")]
    pub quantity: f64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
}

impl PostalRecord {
    pub fn new(code: impl Into<String>, quantity: f64) -> Self {
        Self {
            code: code.into(),
            quantity,
            lat: None,
            lon: None,
            state: None,
            city: None,
            neighborhood: None,
            street: None,
            service: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    /// Takes the coordinates of `result`; metadata it lacks keeps its saved value.
    pub fn apply(&mut self, result: ResolutionResult) {
        let current = ResolutionResult {
            lat: None,
            lon: None,
            state: self.state.take(),
            city: self.city.take(),
            neighborhood: self.neighborhood.take(),
            street: self.street.take(),
            service: self.service.take(),
        };
        let merged = result.merge_metadata(&current);

        self.lat = merged.lat;
        self.lon = merged.lon;
        self.state = merged.state;
        self.city = merged.city;
        self.neighborhood = merged.neighborhood;
        self.street = merged.street;
        self.service = merged.service;
    }
}

/// Output of a geocode lookup. Absent coordinates mean the code stayed unresolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionResult {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub street: Option<String>,
    pub service: Option<String>,
}

impl ResolutionResult {
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    /// Fills every absent metadata field from `other`. Coordinates are never borrowed.
    pub fn merge_metadata(mut self, other: &ResolutionResult) -> Self {
        fn fill(slot: &mut Option<String>, from: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.state, &other.state);
        fill(&mut self.city, &other.city);
        fill(&mut self.neighborhood, &other.neighborhood);
        fill(&mut self.street, &other.street);
        fill(&mut self.service, &other.service);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Local>,
    pub code: String,
    pub reason: String,
    pub raw_response: Option<String>,
}

pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl fmt::Display for ErrorLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[{}] CEP: {} - Error: {}",
            self.timestamp.format(LOG_TIMESTAMP_FORMAT),
            self.code,
            self.reason
        )?;
        if let Some(raw) = &self.raw_response {
            // keep one entry per line pair
            writeln!(f, "  API response: {}", raw.replace(['\r', '\n'], " "))?;
        }
        Ok(())
    }
}

/// Everything the load step needs from a finished batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub records: Vec<PostalRecord>,
    pub pending: usize,
    pub resolved: usize,
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn unresolved(&self) -> usize {
        self.pending - self.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_merge_metadata_keeps_own_values() {
        let primary = ResolutionResult {
            city: Some("São Paulo".to_string()),
            state: Some("SP".to_string()),
            service: Some("brasilapi".to_string()),
            ..Default::default()
        };
        let fallback = ResolutionResult {
            lat: Some(-23.56),
            lon: Some(-46.65),
            city: Some("Sao Paulo".to_string()),
            service: Some("opencage".to_string()),
            ..Default::default()
        };

        let merged = fallback.merge_metadata(&primary);
        assert!(merged.is_resolved());
        assert_eq!(merged.city.as_deref(), Some("Sao Paulo"));
        assert_eq!(merged.state.as_deref(), Some("SP"));
        assert_eq!(merged.service.as_deref(), Some("opencage"));
    }

    #[test]
    fn test_error_log_entry_format() {
        let entry = ErrorLogEntry {
            timestamp: Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            code: "01310100".to_string(),
            reason: "brasilapi: HTTP 404".to_string(),
            raw_response: Some("{\"message\":\n\"not found\"}".to_string()),
        };

        assert_eq!(
            entry.to_string(),
            "[2024-05-01 09:30:00] CEP: 01310100 - Error: brasilapi: HTTP 404\n  API response: {\"message\": \"not found\"}\n"
        );
    }

    #[test]
    fn test_apply_marks_record_resolved() {
        let mut record = PostalRecord::new("01310100", 15.0);
        assert!(!record.is_resolved());

        record.apply(ResolutionResult {
            lat: Some(-23.56),
            lon: Some(-46.65),
            ..Default::default()
        });
        assert!(record.is_resolved());
        assert_eq!(record.quantity, 15.0);
    }

    #[test]
    fn test_apply_unresolved_keeps_saved_metadata() {
        let mut record = PostalRecord::new("01310100", 15.0);
        record.city = Some("São Paulo".to_string());
        record.service = Some("brasilapi".to_string());

        record.apply(ResolutionResult {
            state: Some("SP".to_string()),
            ..Default::default()
        });
        assert!(!record.is_resolved());
        assert_eq!(record.state.as_deref(), Some("SP"));
        assert_eq!(record.city.as_deref(), Some("São Paulo"));
        assert_eq!(record.service.as_deref(), Some("brasilapi"));
    }
}
