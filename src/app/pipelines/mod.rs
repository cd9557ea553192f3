pub mod geocode_pipeline;

pub use geocode_pipeline::{DatasetSource, GeocodePipeline, LogProgress};
