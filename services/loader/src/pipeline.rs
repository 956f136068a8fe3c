//! The transform-and-load pipeline.
//!
//! Order of work against the store:
//! 1. upsert retailer, product and location rows
//! 2. commit, so every surrogate key is visible
//! 3. re-read the three mappings and assemble facts
//! 4. insert facts in batches and commit again
//!
//! Row-level problems drop rows and are counted. Only connection loss or a
//! failed read/commit ends the run early.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::batch::{BatchLoader, LoadOutcome};
use crate::config::Config;
use crate::dimension::{DimensionResolver, Location, Product, Retailer, UpsertOutcome};
use crate::error::StoreError;
use crate::fact::FactAssembler;
use crate::normalize::RecordNormalizer;
use crate::record::{read_raw_records, RawRecord};
use crate::report::{StageCounts, StageReporter};
use crate::sample::{Deduplicator, StratifiedSampler};
use crate::store::SalesStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub sample_size: usize,
    pub sample_seed: u64,
    pub batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            sample_size: config.sample_size,
            sample_seed: config.sample_seed,
            batch_size: config.batch_size,
        }
    }
}

/// Counts for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub read: usize,
    pub unreadable: usize,
    pub normalized: usize,
    pub rejected: usize,
    pub deduplicated: usize,
    pub sampled: usize,
    pub retailers: UpsertOutcome,
    pub products: UpsertOutcome,
    pub locations: UpsertOutcome,
    pub facts: usize,
    pub unresolved: usize,
    pub load: LoadOutcome,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            read = self.read,
            unreadable = self.unreadable,
            normalized = self.normalized,
            rejected = self.rejected,
            deduplicated = self.deduplicated,
            sampled = self.sampled,
            retailers_upserted = self.retailers.upserted,
            products_upserted = self.products.upserted,
            locations_upserted = self.locations.upserted,
            facts = self.facts,
            unresolved = self.unresolved,
            inserted = self.load.inserted,
            failed_batches = self.load.failed_batches,
            "run summary"
        );
    }
}

fn dimension_counts(outcome: &UpsertOutcome) -> StageCounts {
    StageCounts::new(
        outcome.distinct,
        outcome.upserted + outcome.already_present,
        outcome.failed,
    )
}

/// Run every stage from raw records to committed fact rows.
pub async fn run_pipeline<S: SalesStore>(
    store: &mut S,
    raw: &[RawRecord],
    settings: &PipelineSettings,
    reporter: &dyn StageReporter,
) -> Result<RunSummary, StoreError> {
    let mut summary = RunSummary::default();

    let normalized = RecordNormalizer.normalize(raw);
    summary.normalized = normalized.records.len();
    summary.rejected = normalized.rejected.len();
    reporter.record_stage(
        "normalize",
        StageCounts::new(raw.len(), summary.normalized, summary.rejected),
    );

    let deduplicated = Deduplicator::default().deduplicate(normalized.records);
    summary.deduplicated = deduplicated.len();
    reporter.record_stage(
        "deduplicate",
        StageCounts::new(summary.normalized, summary.deduplicated, 0),
    );

    let sampled = StratifiedSampler::new(settings.sample_size, settings.sample_seed)
        .sample(&deduplicated);
    summary.sampled = sampled.len();
    reporter.record_stage("sample", StageCounts::new(summary.deduplicated, summary.sampled, 0));

    let retailers = DimensionResolver::<Retailer>::new();
    let products = DimensionResolver::<Product>::new();
    let locations = DimensionResolver::<Location>::new();

    summary.retailers = retailers.stage(store, &sampled).await?;
    reporter.record_stage("retailer", dimension_counts(&summary.retailers));
    summary.products = products.stage(store, &sampled).await?;
    reporter.record_stage("product", dimension_counts(&summary.products));
    summary.locations = locations.stage(store, &sampled).await?;
    reporter.record_stage("location", dimension_counts(&summary.locations));

    store.commit().await?;

    let retailer_map = retailers.build_mapping(store).await?;
    let product_map = products.build_mapping(store).await?;
    let location_map = locations.build_mapping(store).await?;

    let assembly = FactAssembler {
        retailers: &retailer_map,
        products: &product_map,
        locations: &location_map,
    }
    .assemble(&sampled);
    summary.facts = assembly.facts.len();
    summary.unresolved = assembly.unresolved;
    reporter.record_stage(
        "assemble",
        StageCounts::new(summary.sampled, summary.facts, summary.unresolved),
    );

    summary.load = BatchLoader::new(settings.batch_size)
        .load(store, &assembly.facts)
        .await?;
    reporter.record_stage(
        "load",
        StageCounts::new(
            summary.load.attempted,
            summary.load.inserted as usize,
            summary.load.failed_rows,
        ),
    );

    store.commit().await?;
    Ok(summary)
}

/// Read `file_path` and run the pipeline against `store`.
///
/// The store is closed on every path, including errors.
pub async fn load_file_into<S: SalesStore>(
    mut store: S,
    file_path: &Path,
    settings: &PipelineSettings,
    reporter: &dyn StageReporter,
) -> Result<RunSummary> {
    let result = async {
        let batch = read_raw_records(file_path).await?;
        reporter.record_stage(
            "read",
            StageCounts::new(
                batch.records.len() + batch.unreadable,
                batch.records.len(),
                batch.unreadable,
            ),
        );

        let mut summary = run_pipeline(&mut store, &batch.records, settings, reporter)
            .await
            .context("Pipeline aborted")?;
        summary.read = batch.records.len();
        summary.unreadable = batch.unreadable;
        Ok::<RunSummary, anyhow::Error>(summary)
    }
    .await;

    let closed = store.close().await;
    let summary = result?;
    closed.context("Failed to close store")?;
    Ok(summary)
}
