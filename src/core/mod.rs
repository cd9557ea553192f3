pub mod coordinator;
pub mod dataset;
pub mod etl;
pub mod ingest;
pub mod markers;

pub use crate::domain::model::{BatchOutcome, ErrorLogEntry, PostalRecord, ResolutionResult};
pub use crate::domain::ports::{Geocoder, Pipeline, ProgressReporter, Storage};
pub use crate::utils::error::Result;
