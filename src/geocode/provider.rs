//! Geocoding providers described as data.
//!
//! A provider is an endpoint template plus the JSON paths where the
//! coordinates and address metadata live in its response. Adding,
//! removing or reordering providers is a configuration change.

use crate::domain::model::ResolutionResult;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Dotted JSON paths into a provider response. Numeric segments index arrays
/// (`results.0.geometry.lat`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPaths {
    pub latitude: String,
    pub longitude: String,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// URL template; `{code}`, `{query}` and `{key}` are substituted per request.
    pub endpoint: String,
    /// Free-text query built from `{code}`, e.g. `"{code}, Brazil"`.
    #[serde(default)]
    pub query_template: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub fields: FieldPaths,
    #[serde(default = "default_rate_limit_statuses")]
    pub rate_limit_statuses: Vec<u16>,
}

fn default_enabled() -> bool {
    true
}

fn default_rate_limit_statuses() -> Vec<u16> {
    vec![429]
}

impl ProviderConfig {
    /// Postal-code lookup keyed by the code in the URL path.
    pub fn brasil_api() -> Self {
        Self {
            name: "brasilapi".to_string(),
            endpoint: "https://brasilapi.com.br/api/cep/v2/{code}".to_string(),
            query_template: None,
            api_key: None,
            enabled: true,
            fields: FieldPaths {
                latitude: "location.coordinates.latitude".to_string(),
                longitude: "location.coordinates.longitude".to_string(),
                state: Some("state".to_string()),
                city: Some("city".to_string()),
                neighborhood: Some("neighborhood".to_string()),
                street: Some("street".to_string()),
                service: Some("service".to_string()),
            },
            rate_limit_statuses: default_rate_limit_statuses(),
        }
    }

    /// Free-text geocoder queried with `"<code>, Brazil"`.
    pub fn open_cage(api_key: impl Into<String>) -> Self {
        Self {
            name: "opencage".to_string(),
            endpoint: "https://api.opencagedata.com/geocode/v1/json?q={query}&key={key}"
                .to_string(),
            query_template: Some("{code}, Brazil".to_string()),
            api_key: Some(api_key.into()),
            enabled: true,
            fields: FieldPaths {
                latitude: "results.0.geometry.lat".to_string(),
                longitude: "results.0.geometry.lng".to_string(),
                state: Some("results.0.components.state".to_string()),
                city: Some("results.0.components.city".to_string()),
                neighborhood: Some("results.0.components.suburb".to_string()),
                street: Some("results.0.components.road".to_string()),
                service: None,
            },
            rate_limit_statuses: default_rate_limit_statuses(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn requires_api_key(&self) -> bool {
        self.endpoint.contains("{key}")
    }

    /// Substitutes the placeholders of the endpoint template for `code`.
    pub fn expand_endpoint(&self, code: &str) -> String {
        let query = self
            .query_template
            .as_deref()
            .unwrap_or("{code}")
            .replace("{code}", code);
        let key = self.api_key.as_deref().unwrap_or_default();

        self.endpoint
            .replace("{code}", &encode(code))
            .replace("{query}", &encode(&query))
            .replace("{key}", &encode(key))
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    RateLimited,
    Failed,
}

#[derive(Debug, Error)]
pub enum ProviderFailure {
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String, raw: Option<String> },

    #[error("unreachable: {detail}")]
    Unreachable { detail: String },

    #[error("HTTP {status}")]
    Rejected { status: u16, raw: Option<String> },

    #[error("response has no coordinates")]
    NoCoordinates { raw: String },

    #[error("invalid request URL '{url}': {detail}")]
    InvalidRequest { url: String, detail: String },
}

impl ProviderFailure {
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::MalformedResponse { raw, .. } | Self::Rejected { raw, .. } => raw.as_deref(),
            Self::NoCoordinates { raw } => Some(raw),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse {
                detail: err.to_string(),
                raw: None,
            }
        } else {
            Self::Unreachable {
                detail: err.to_string(),
            }
        }
    }
}

/// What the resolver needs from a provider: where to ask, how to read the
/// status, and how to read the payload.
pub trait GeocodeProvider: Send + Sync {
    fn name(&self) -> &str;
    fn request_url(&self, code: &str) -> Result<Url, ProviderFailure>;
    fn classify(&self, status: StatusCode) -> StatusClass;
    /// Missing or unparsable fields come back as `None`; only a body that is
    /// not JSON at all is an error.
    fn parse(&self, body: &str) -> Result<ResolutionResult, ProviderFailure>;
}

pub struct HttpProvider {
    config: ProviderConfig,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

impl GeocodeProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn request_url(&self, code: &str) -> Result<Url, ProviderFailure> {
        let expanded = self.config.expand_endpoint(code);
        Url::parse(&expanded).map_err(|e| ProviderFailure::InvalidRequest {
            url: expanded.clone(),
            detail: e.to_string(),
        })
    }

    fn classify(&self, status: StatusCode) -> StatusClass {
        if self.config.rate_limit_statuses.contains(&status.as_u16()) {
            StatusClass::RateLimited
        } else if status == StatusCode::OK {
            StatusClass::Success
        } else {
            StatusClass::Failed
        }
    }

    fn parse(&self, body: &str) -> Result<ResolutionResult, ProviderFailure> {
        let payload: Value =
            serde_json::from_str(body).map_err(|e| ProviderFailure::MalformedResponse {
                detail: e.to_string(),
                raw: Some(body.to_string()),
            })?;

        let fields = &self.config.fields;
        let text = |path: &Option<String>| {
            path.as_deref()
                .and_then(|p| lookup(&payload, p))
                .and_then(as_text)
        };

        let lat = lookup(&payload, &fields.latitude)
            .and_then(as_f64)
            .filter(|v| (-90.0..=90.0).contains(v));
        let lon = lookup(&payload, &fields.longitude)
            .and_then(as_f64)
            .filter(|v| (-180.0..=180.0).contains(v));

        Ok(ResolutionResult {
            lat,
            lon,
            state: text(&fields.state),
            city: text(&fields.city),
            neighborhood: text(&fields.neighborhood),
            street: text(&fields.street),
            service: text(&fields.service).or_else(|| Some(self.config.name.clone())),
        })
    }
}

/// Follows a dotted path through objects and arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
