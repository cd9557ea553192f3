pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod geocode;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use app::pipelines::{DatasetSource, GeocodePipeline};
pub use config::{cli::LocalStorage, toml_config::GeocodeConfig};
pub use core::{coordinator::BatchCoordinator, etl::EtlEngine};
pub use utils::error::{EtlError, Result};
