//! Course Catalog Ingest - batch ingestion tool

use anyhow::Result;
use catalog_common::logging::{init_logging, LogConfig, LogLevel};
use catalog_ingest::{Cli, IngestDriver, SchoolRegistry};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(LogLevel::from_verbosity(cli.verbose))
        .log_file_prefix("catalog-ingest")
        .build();

    // Environment variables take precedence over flags
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = init_logging(&log_config)?;

    let options = cli.into_options();
    let registry = SchoolRegistry::builtin();
    let mut driver = IngestDriver::new(&registry, std::io::stderr());

    match driver.handle(&options).await {
        Ok(report) => {
            info!(
                completed = report.completed(),
                failed = report.failed(),
                "Ingestion complete"
            );
            Ok(())
        },
        Err(e) => {
            error!(error = %e, "Invalid ingestion request");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        },
    }
}
