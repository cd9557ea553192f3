pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::{Parser, ValueEnum};
#[cfg(feature = "cli")]
use std::path::PathBuf;
#[cfg(feature = "cli")]
use toml_config::GeocodeConfig;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "cep-sales-map")]
#[command(about = "Geocode sales by postal code (CEP) and export map markers")]
pub struct CliConfig {
    /// Semicolon-delimited sales CSV with `cep` and `quantidade` columns
    #[arg(required_unless_present_any = ["resume", "list"])]
    pub input: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding saved datasets
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Continue a saved dataset, resolving only rows still missing coordinates
    #[arg(long, conflicts_with = "input")]
    pub resume: Option<String>,

    /// List saved datasets and exit
    #[arg(long)]
    pub list: bool,

    /// Maximum simultaneous geocoding requests
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Error log file
    #[arg(long)]
    pub error_log: Option<String>,

    /// Skip the GeoJSON marker export
    #[arg(long)]
    pub no_markers: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Loads the configuration file, or the defaults, and applies the flags on top.
    pub fn resolve_config(&self) -> crate::Result<GeocodeConfig> {
        let mut config = match &self.config {
            Some(path) => GeocodeConfig::from_file(path)?,
            None => GeocodeConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.output.data_dir = dir.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.geocode.concurrency = concurrency;
        }
        if let Some(path) = &self.error_log {
            config.error_log.path = path.clone();
        }
        if self.no_markers {
            config.output.markers = false;
        }

        Ok(config)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file_values() {
        let cli = CliConfig::parse_from([
            "cep-sales-map",
            "vendas.csv",
            "--data-dir",
            "/tmp/saved",
            "--concurrency",
            "5",
            "--no-markers",
        ]);

        let config = cli.resolve_config().unwrap();
        assert_eq!(cli.input, Some(PathBuf::from("vendas.csv")));
        assert_eq!(config.output.data_dir, "/tmp/saved");
        assert_eq!(config.geocode.concurrency, 5);
        assert!(!config.output.markers);
        assert_eq!(config.error_log.path, "logs/erros.log");
    }

    #[test]
    fn test_input_or_resume_required() {
        assert!(CliConfig::try_parse_from(["cep-sales-map"]).is_err());
        assert!(CliConfig::try_parse_from(["cep-sales-map", "--list"]).is_ok());
        assert!(CliConfig::try_parse_from(["cep-sales-map", "--resume", "dados_vendas.csv"]).is_ok());
        assert!(
            CliConfig::try_parse_from(["cep-sales-map", "a.csv", "--resume", "dados_a.csv"]).is_err()
        );
    }
}
