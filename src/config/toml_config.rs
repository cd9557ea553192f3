use crate::geocode::{ProviderConfig, RetryPolicy};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range,
    validate_required_field, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub geocode: ResolverConfig,
    #[serde(default)]
    pub error_log: ErrorLogConfig,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidRowPolicy {
    /// The whole upload fails with the first bad row.
    Reject,
    /// Bad rows are dropped with a warning.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub delimiter: String,
    pub code_column: String,
    pub quantity_column: String,
    pub on_invalid_row: InvalidRowPolicy,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            delimiter: ";".to_string(),
            code_column: "cep".to_string(),
            quantity_column: "quantidade".to_string(),
            on_invalid_row: InvalidRowPolicy::Reject,
        }
    }
}

impl InputConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(EtlError::InvalidConfigValueError {
                field: "input.delimiter".to_string(),
                value: self.delimiter.clone(),
                reason: "Delimiter must be a single ASCII character".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub data_dir: String,
    pub file_prefix: String,
    pub markers: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            file_prefix: "dados_".to_string(),
            markers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub concurrency: usize,
    pub timeout_seconds: u64,
    pub max_rate_limit_retries: u32,
    pub rate_limit_backoff_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            concurrency: 20,
            timeout_seconds: 10,
            max_rate_limit_retries: retry.max_rate_limit_retries,
            rate_limit_backoff_ms: retry.backoff.as_millis() as u64,
        }
    }
}

impl ResolverConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_rate_limit_retries: self.max_rate_limit_retries,
            backoff: Duration::from_millis(self.rate_limit_backoff_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorLogConfig {
    pub path: String,
    pub clear_on_start: bool,
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self {
            path: "logs/erros.log".to_string(),
            clear_on_start: true,
        }
    }
}

/// The postal-code API first, then the free-text geocoder when a key is available.
pub fn default_providers() -> Vec<ProviderConfig> {
    let mut providers = vec![ProviderConfig::brasil_api()];
    match std::env::var("OPENCAGE_API_KEY") {
        Ok(key) if !key.trim().is_empty() => providers.push(ProviderConfig::open_cage(key)),
        _ => tracing::debug!("OPENCAGE_API_KEY not set, opencage fallback disabled"),
    }
    providers
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            output: OutputConfig::default(),
            geocode: ResolverConfig::default(),
            error_log: ErrorLogConfig::default(),
            providers: default_providers(),
        }
    }
}

impl GeocodeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unset variables are left as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.output.data_dir)
    }

    pub fn validate_config(&self) -> Result<()> {
        self.input.delimiter_byte()?;
        validate_non_empty_string("input.code_column", &self.input.code_column)?;
        validate_non_empty_string("input.quantity_column", &self.input.quantity_column)?;

        validate_path("output.data_dir", &self.output.data_dir)?;
        validate_path("error_log.path", &self.error_log.path)?;

        validate_positive_number("geocode.concurrency", self.geocode.concurrency, 1)?;
        validate_range("geocode.timeout_seconds", self.geocode.timeout_seconds, 1, 300)?;
        validate_range(
            "geocode.max_rate_limit_retries",
            self.geocode.max_rate_limit_retries,
            0,
            50,
        )?;

        for provider in self.enabled_providers() {
            let field = format!("providers.{}", provider.name);
            validate_non_empty_string(&format!("{}.name", field), &provider.name)?;
            if provider.requires_api_key() {
                validate_required_field(&format!("{}.api_key", field), &provider.api_key)?;
            }
            validate_url(
                &format!("{}.endpoint", field),
                &provider.expand_endpoint("00000000"),
            )?;
        }

        if self.enabled_providers().next().is_none() {
            return Err(EtlError::ConfigValidationError {
                field: "providers".to_string(),
                message: "At least one enabled provider is required".to_string(),
            });
        }

        Ok(())
    }
}

impl Validate for GeocodeConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
