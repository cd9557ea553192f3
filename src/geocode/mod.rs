//! Postal code geocoding: providers, the resolver chain, and the error log.

pub mod error_log;
pub mod provider;
pub mod resolver;

pub use error_log::ErrorLog;
pub use provider::{FieldPaths, GeocodeProvider, HttpProvider, ProviderConfig, ProviderFailure};
pub use resolver::{GeocodeResolver, RetryPolicy};
