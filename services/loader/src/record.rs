//! Record types and the CSV reader for the sales dataset.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

/// One row of the source file, exactly as written.
///
/// The serde renames carry the mapping from source headers to canonical
/// field names; no value is interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "Retailer ID")]
    pub retailer_id: String,
    #[serde(rename = "Retailer")]
    pub retailer_name: String,
    #[serde(rename = "Product")]
    pub product_name: String,
    #[serde(rename = "Price per Unit")]
    pub price_per_unit: String,
    #[serde(rename = "Invoice Date")]
    pub invoice_date: String,
    #[serde(rename = "Units Sold")]
    pub units_sold: String,
    #[serde(rename = "Total Sales")]
    pub total_sales: String,
    #[serde(rename = "Operating Profit")]
    pub operating_profit: String,
    #[serde(rename = "Operating Margin")]
    pub operating_margin: String,
    #[serde(rename = "Sales Method")]
    pub sales_method: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Region")]
    pub region: String,
}

/// A validated row with canonical types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanRecord {
    pub retailer_id: i32,
    pub retailer_name: String,
    pub product_name: String,
    pub price_per_unit: Decimal,
    pub invoice_date: NaiveDate,
    pub units_sold: i32,
    pub total_sales: Decimal,
    pub operating_profit: Decimal,
    /// Fraction in [0, 1].
    pub operating_margin: Decimal,
    pub sales_method: String,
    pub city: String,
    pub state: String,
    pub region: String,
}

/// Records read from the source plus the number of unreadable lines.
#[derive(Debug, Default)]
pub struct RawBatch {
    pub records: Vec<RawRecord>,
    pub unreadable: usize,
}

/// Parse CSV content into raw records, in file order.
///
/// Lines the CSV layer cannot deserialize are skipped with a warning.
pub fn parse_raw_records(content: &str) -> RawBatch {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut batch = RawBatch::default();
    for (line_idx, result) in reader.deserialize::<RawRecord>().enumerate() {
        match result {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                // +2: 1-indexed and header
                warn!(line = line_idx + 2, error = %e, "skipping unreadable line");
                batch.unreadable += 1;
            }
        }
    }
    batch
}

/// Read and parse the dataset at `path`.
pub async fn read_raw_records(path: &Path) -> Result<RawBatch> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    info!(path = %path.display(), bytes = content.len(), "dataset read");
    Ok(parse_raw_records(&content))
}
