use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use loader::config::Config;
use loader::pipeline::{load_file_into, PipelineSettings};
use loader::report::TracingReporter;
use loader::store::memory::MemoryStore;

#[derive(Parser, Debug)]
#[command(name = "loader", about = "Loads a retail sales CSV into the sales schema")]
struct Args {
    /// Path to the sales dataset (CSV)
    #[arg(long)]
    file: PathBuf,

    /// Dry run - run the pipeline in memory, don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mode = if args.dry_run { "dry-run" } else { "live" };
    info!(file = %args.file.display(), mode, "=== Retail Sales Loader ===");

    let summary = if args.dry_run {
        let config = Config::from_env();
        load_file_into(
            MemoryStore::new(),
            &args.file,
            &PipelineSettings::from(&config),
            &TracingReporter,
        )
        .await?
    } else {
        loader::load_data_to_store(&args.file).await?
    };

    summary.log();
    if args.dry_run {
        info!("Dry run complete - nothing written to the database");
    } else {
        info!("Data loaded into database successfully");
    }
    Ok(())
}
