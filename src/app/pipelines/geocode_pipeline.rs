use crate::config::toml_config::GeocodeConfig;
use crate::core::coordinator::{BatchCoordinator, CancelSignal};
use crate::core::dataset::{dataset_name_for_upload, pending_indices, read_dataset, write_dataset};
use crate::core::ingest::parse_sales_csv;
use crate::core::markers::{build_markers, to_geojson};
use crate::core::{BatchOutcome, Pipeline, PostalRecord, ProgressReporter, Storage};
use crate::geocode::{ErrorLog, GeocodeResolver};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_file_extension, validate_file_name};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Where a batch's records come from.
#[derive(Debug, Clone)]
pub enum DatasetSource {
    /// A raw sales upload; every code is resolved.
    Upload(PathBuf),
    /// A dataset saved by an earlier run; only unresolved codes are queried.
    Saved(String),
}

/// Logs geocoding progress each time the whole percentage changes.
#[derive(Debug, Default)]
pub struct LogProgress {
    last_percent: AtomicUsize,
}

impl ProgressReporter for LogProgress {
    fn report(&self, completed: usize, total: usize) {
        if total == 0 {
            return;
        }
        let percent = completed * 100 / total;
        let previous = self.last_percent.swap(percent, Ordering::Relaxed);
        if percent != previous || completed == 0 {
            tracing::info!(
                "🔄 Obtaining coordinates: {}% ({}/{})",
                percent,
                completed,
                total
            );
        }
    }
}

pub struct GeocodePipeline<S: Storage> {
    storage: S,
    config: GeocodeConfig,
    source: DatasetSource,
    cancel: CancelSignal,
    progress: Arc<dyn ProgressReporter>,
}

impl<S: Storage> GeocodePipeline<S> {
    pub fn new(storage: S, config: GeocodeConfig, source: DatasetSource) -> Self {
        Self {
            storage,
            config,
            source,
            cancel: CancelSignal::never(),
            progress: Arc::new(LogProgress::default()),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// File name of the dataset this batch reads back and persists to.
    pub fn dataset_name(&self) -> String {
        match &self.source {
            DatasetSource::Upload(path) => {
                dataset_name_for_upload(&self.config.output.file_prefix, path)
            }
            DatasetSource::Saved(name) => name.clone(),
        }
    }

    pub fn markers_name(&self) -> String {
        let dataset = self.dataset_name();
        let stem = Path::new(&dataset)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(dataset);
        format!("markers_{}.geojson", stem)
    }

    fn error_log(&self) -> Arc<ErrorLog> {
        Arc::new(ErrorLog::new(&self.config.error_log.path))
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for GeocodePipeline<S> {
    async fn extract(&self) -> Result<Vec<PostalRecord>> {
        let records = match &self.source {
            DatasetSource::Upload(path) => {
                validate_file_extension("input", path, &["csv"])?;
                tracing::info!("📂 Reading upload {}", path.display());
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|source| EtlError::InputFileError {
                        path: path.display().to_string(),
                        source,
                    })?;
                parse_sales_csv(&data, &self.config.input)?
            }
            DatasetSource::Saved(name) => {
                validate_file_name("resume", name)?;
                tracing::info!("📂 Loading saved dataset {}", self.storage.display_path(name));
                let data = self.storage.read_file(name).await?;
                read_dataset(&data)?
            }
        };

        tracing::info!("📊 {} postal codes loaded", records.len());
        Ok(records)
    }

    async fn transform(&self, records: Vec<PostalRecord>) -> Result<BatchOutcome> {
        let pending = pending_indices(&records).len();
        if pending == 0 {
            tracing::info!("✅ All {} postal codes already have coordinates", records.len());
            return Ok(BatchOutcome {
                records,
                pending: 0,
                resolved: 0,
                cancelled: false,
            });
        }

        let error_log = self.error_log();
        if self.config.error_log.clear_on_start {
            error_log.clear().await?;
        }

        // one client per batch, dropped with the coordinator
        let client = GeocodeResolver::build_client(self.config.geocode.timeout())?;
        let resolver = GeocodeResolver::from_configs(
            client,
            &self.config.providers,
            self.config.geocode.retry_policy(),
            error_log.clone(),
        );
        tracing::info!("🌎 Provider chain: {}", resolver.provider_names().join(" → "));

        let coordinator = BatchCoordinator::new(resolver, self.config.geocode.concurrency);
        let records = coordinator
            .resolve_pending(records, self.progress.as_ref(), &self.cancel)
            .await;
        drop(coordinator);

        let still_pending = pending_indices(&records).len();
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            tracing::warn!("⚠️ Batch cancelled, {} postal codes left unresolved", still_pending);
        }
        if still_pending > 0 {
            tracing::warn!(
                "⚠️ {} postal codes unresolved, see {}",
                still_pending,
                error_log.path().display()
            );
        }

        Ok(BatchOutcome {
            records,
            pending,
            resolved: pending - still_pending,
            cancelled,
        })
    }

    async fn load(&self, outcome: BatchOutcome) -> Result<String> {
        let dataset_name = self.dataset_name();

        if outcome.pending > 0 {
            let data = write_dataset(&outcome.records)?;
            self.storage.write_file(&dataset_name, &data).await?;
            tracing::info!(
                "💾 Saved {} records ({} newly resolved, {} unresolved) to {}",
                outcome.records.len(),
                outcome.resolved,
                outcome.unresolved(),
                self.storage.display_path(&dataset_name)
            );
        } else {
            tracing::info!("Nothing was pending, dataset left unchanged");
        }

        if self.config.output.markers {
            let markers = build_markers(&outcome.records);
            let geojson = serde_json::to_vec_pretty(&to_geojson(&markers))?;
            let markers_name = self.markers_name();
            self.storage.write_file(&markers_name, &geojson).await?;
            tracing::info!(
                "🗺️ Exported {} markers to {}",
                markers.len(),
                self.storage.display_path(&markers_name)
            );
        }

        Ok(self.storage.display_path(&dataset_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        async fn list_files(&self, extension: &str) -> Result<Vec<String>> {
            let suffix = format!(".{}", extension);
            let mut names: Vec<String> = self
                .files
                .lock()
                .await
                .keys()
                .filter(|k| k.ends_with(&suffix))
                .cloned()
                .collect();
            names.sort();
            Ok(names)
        }

        fn display_path(&self, path: &str) -> String {
            format!("mock://{}", path)
        }
    }

    fn resolved(code: &str) -> PostalRecord {
        let mut record = PostalRecord::new(code, 2.0);
        record.lat = Some(-23.5);
        record.lon = Some(-46.6);
        record
    }

    #[test]
    fn test_names_follow_upload() {
        let pipeline = GeocodePipeline::new(
            MockStorage::default(),
            GeocodeConfig::default(),
            DatasetSource::Upload(PathBuf::from("/uploads/vendas_marco.csv")),
        );
        assert_eq!(pipeline.dataset_name(), "dados_vendas_marco.csv");
        assert_eq!(pipeline.markers_name(), "markers_dados_vendas_marco.geojson");
    }

    #[tokio::test]
    async fn test_resolved_saved_dataset_is_not_rewritten() {
        let storage = MockStorage::default();
        let original = write_dataset(&[resolved("01310100")]).unwrap();
        storage.write_file("dados_vendas.csv", &original).await.unwrap();

        let mut config = GeocodeConfig::default();
        config.output.markers = false;
        let pipeline = GeocodePipeline::new(
            storage.clone(),
            config,
            DatasetSource::Saved("dados_vendas.csv".to_string()),
        );

        let records = pipeline.extract().await.unwrap();
        let outcome = pipeline.transform(records).await.unwrap();
        assert_eq!(outcome.pending, 0);

        storage.files.lock().await.remove("dados_vendas.csv");
        let path = pipeline.load(outcome).await.unwrap();
        assert_eq!(path, "mock://dados_vendas.csv");
        assert!(storage.get_file("dados_vendas.csv").await.is_none());
    }

    #[tokio::test]
    async fn test_load_writes_dataset_and_markers() {
        let storage = MockStorage::default();
        let pipeline = GeocodePipeline::new(
            storage.clone(),
            GeocodeConfig::default(),
            DatasetSource::Saved("dados_vendas.csv".to_string()),
        );

        let outcome = BatchOutcome {
            records: vec![resolved("01310100"), PostalRecord::new("22041001", 1.0)],
            pending: 2,
            resolved: 1,
            cancelled: false,
        };
        pipeline.load(outcome).await.unwrap();

        let dataset = storage.get_file("dados_vendas.csv").await.unwrap();
        assert_eq!(read_dataset(&dataset).unwrap().len(), 2);

        let markers = storage.get_file("markers_dados_vendas.geojson").await.unwrap();
        let geojson: serde_json::Value = serde_json::from_slice(&markers).unwrap();
        assert_eq!(geojson["features"].as_array().unwrap().len(), 1);
        assert_eq!(storage.list_files("csv").await.unwrap(), vec!["dados_vendas.csv"]);
    }

    #[test]
    fn test_log_progress_tolerates_empty_batch() {
        let progress = LogProgress::default();
        progress.report(0, 0);
        progress.report(1, 4);
        assert_eq!(progress.last_percent.load(Ordering::Relaxed), 25);
    }
}
