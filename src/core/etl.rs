use crate::core::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

/// Summary of one engine run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub output_path: String,
    pub records: usize,
    pub pending: usize,
    pub resolved: usize,
    pub cancelled: bool,
}

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        tracing::info!("Starting geocoding batch");

        // Extract
        let records = self.pipeline.extract().await?;
        tracing::debug!("Extracted {} records", records.len());

        // Transform
        let outcome = self.pipeline.transform(records).await?;
        let (total, pending, resolved, cancelled) = (
            outcome.records.len(),
            outcome.pending,
            outcome.resolved,
            outcome.cancelled,
        );
        tracing::debug!("Resolved {}/{} pending postal codes", resolved, pending);

        // Load
        let output_path = self.pipeline.load(outcome).await?;
        tracing::info!("Batch finished in {:?}", started.elapsed());

        Ok(RunReport {
            output_path,
            records: total,
            pending,
            resolved,
            cancelled,
        })
    }
}
