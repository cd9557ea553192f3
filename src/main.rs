use cep_sales_map::config::LogFormat;
use cep_sales_map::core::coordinator::cancel_pair;
use cep_sales_map::core::Storage;
use cep_sales_map::geocode::ErrorLog;
use cep_sales_map::utils::error::ErrorSeverity;
use cep_sales_map::utils::logger;
use cep_sales_map::utils::validation::Validate;
use cep_sales_map::{CliConfig, DatasetSource, EtlEngine, GeocodePipeline, LocalStorage};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    match cli.log_format {
        LogFormat::Compact => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }

    tracing::info!("Starting cep-sales-map");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match cli.resolve_config().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    let storage = LocalStorage::new(config.data_dir());

    if cli.list {
        let datasets = storage.list_files("csv").await?;
        if datasets.is_empty() {
            println!("No saved datasets in {}", storage.base_path().display());
        }
        for name in datasets {
            println!("{}", name);
        }
        return Ok(());
    }

    let source = match (&cli.resume, &cli.input) {
        (Some(name), _) => DatasetSource::Saved(name.clone()),
        (None, Some(path)) => DatasetSource::Upload(path.clone()),
        (None, None) => anyhow::bail!("an input file or --resume is required"),
    };

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, cancelling outstanding lookups...");
            cancel_handle.cancel();
        }
    });

    let error_log = ErrorLog::new(&config.error_log.path);
    let pipeline = GeocodePipeline::new(storage, config, source).with_cancel(cancel);
    let engine = EtlEngine::new(pipeline);

    match engine.run().await {
        Ok(report) => {
            println!("✅ {} postal codes, {} resolved in this run", report.records, report.resolved);
            if report.cancelled {
                println!("⚠️ Run was cancelled; resume with --resume to finish");
            }
            println!("📁 Dataset: {}", report.output_path);

            let errors = error_log.entries().await.unwrap_or_else(|e| {
                tracing::warn!(
                    "⚠️ Could not read error log {}: {}",
                    error_log.path().display(),
                    e
                );
                Vec::new()
            });
            if !errors.is_empty() {
                println!(
                    "⚠️ {} lookup errors recorded in {}",
                    errors.len(),
                    error_log.path().display()
                );
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Batch failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
