use crate::domain::model::{BatchOutcome, PostalRecord, ResolutionResult};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// File names directly under the storage root ending with `extension`, sorted.
    fn list_files(
        &self,
        extension: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
    /// Location of `path` as shown to the user.
    fn display_path(&self, path: &str) -> String;
}

/// Turns a postal code into coordinates. Implementations never fail; an
/// unresolvable code comes back with absent coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, code: &str) -> ResolutionResult;
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, completed: usize, total: usize);
}

impl<F> ProgressReporter for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn report(&self, completed: usize, total: usize) {
        self(completed, total)
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<PostalRecord>>;
    async fn transform(&self, records: Vec<PostalRecord>) -> Result<BatchOutcome>;
    async fn load(&self, outcome: BatchOutcome) -> Result<String>;
}
