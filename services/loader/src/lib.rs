//! Retail sales loader - cleans a sales CSV and loads it into four tables
//!
//! Responsibilities:
//! - Normalize currency, percentage, integer and date fields
//! - Deduplicate and draw a stratified sample
//! - Upsert retailer, product and location dimensions
//! - Resolve foreign keys and insert sales transactions in batches
//!
//! CRITICAL: re-running against the same database must not duplicate
//! dimension rows. Same file + same seed = same sample.

use anyhow::{Context, Result};
use std::path::Path;

pub mod batch;
pub mod config;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod sample;
pub mod store;

use config::Config;
use pipeline::{load_file_into, PipelineSettings, RunSummary};
use report::TracingReporter;
use store::postgres::PgStore;

/// Load the dataset at `file_path` into the database named by `DB_URL`.
///
/// Fails before reading the file when the database is unreachable.
pub async fn load_data_to_store(file_path: &Path) -> Result<RunSummary> {
    let config = Config::from_env();
    let store = PgStore::connect(config.require_db_url()?)
        .await
        .context("Failed to connect to database")?;
    load_file_into(
        store,
        file_path,
        &PipelineSettings::from(&config),
        &TracingReporter,
    )
    .await
}
