//! Field normalization: raw text to typed `CleanRecord`s.
//!
//! Every coercion happens here once. Downstream stages only ever see
//! validated values.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

use crate::error::NormalizeError;
use crate::record::{CleanRecord, RawRecord};

const DATE_FORMAT: &str = "%d/%m/%Y";

/// Result of normalizing a batch of raw records.
#[derive(Debug, Default)]
pub struct Normalized {
    pub records: Vec<CleanRecord>,
    /// Input position and reason for each dropped row.
    pub rejected: Vec<(usize, NormalizeError)>,
}

/// Converts raw rows into clean rows, dropping the ones that fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn normalize(&self, raw: &[RawRecord]) -> Normalized {
        let mut out = Normalized::default();
        for (idx, record) in raw.iter().enumerate() {
            match normalize_record(record) {
                Ok(clean) => out.records.push(clean),
                Err(e) => {
                    warn!(row = idx, error = %e, "dropping malformed row");
                    out.rejected.push((idx, e));
                }
            }
        }
        out
    }
}

/// Normalize a single record.
pub fn normalize_record(raw: &RawRecord) -> Result<CleanRecord, NormalizeError> {
    Ok(CleanRecord {
        retailer_id: parse_integer("Retailer_ID", &raw.retailer_id)?,
        retailer_name: raw.retailer_name.trim().to_string(),
        product_name: raw.product_name.trim().to_string(),
        price_per_unit: parse_currency("Price_per_Unit", &raw.price_per_unit)?,
        invoice_date: parse_invoice_date(&raw.invoice_date)?,
        units_sold: parse_integer("Units_Sold", &raw.units_sold)?,
        total_sales: parse_currency("Total_Sales", &raw.total_sales)?,
        operating_profit: parse_currency("Operating_Profit", &raw.operating_profit)?,
        operating_margin: parse_percentage("Operating_Margin", &raw.operating_margin)?,
        sales_method: raw.sales_method.trim().to_string(),
        city: raw.city.trim().to_string(),
        state: raw.state.trim().to_string(),
        region: raw.region.trim().to_string(),
    })
}

fn malformed_numeric(field: &'static str, value: &str) -> NormalizeError {
    NormalizeError::MalformedNumericField {
        field,
        value: value.to_string(),
    }
}

/// Digits with at most one `.` and an optional leading sign.
fn is_plain_decimal(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    !digits.is_empty()
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn parse_decimal(
    field: &'static str,
    cleaned: &str,
    value: &str,
) -> Result<Decimal, NormalizeError> {
    let cleaned = cleaned.trim();
    if !is_plain_decimal(cleaned) {
        return Err(malformed_numeric(field, value));
    }
    Decimal::from_str(cleaned).map_err(|_| malformed_numeric(field, value))
}

/// `"$1,234.50"` -> `1234.50`
pub fn parse_currency(field: &'static str, value: &str) -> Result<Decimal, NormalizeError> {
    let cleaned: String = value.chars().filter(|c| *c != '$' && *c != ',').collect();
    parse_decimal(field, &cleaned, value)
}

/// `"1,200"` -> `1200`
pub fn parse_integer(field: &'static str, value: &str) -> Result<i32, NormalizeError> {
    let cleaned = value.replace(',', "");
    cleaned
        .trim()
        .parse::<i32>()
        .map_err(|_| malformed_numeric(field, value))
}

/// `"75%"` -> `0.75`
pub fn parse_percentage(field: &'static str, value: &str) -> Result<Decimal, NormalizeError> {
    let cleaned = value.replace('%', "");
    let percent = parse_decimal(field, &cleaned, value)?;
    let fraction = percent / Decimal::ONE_HUNDRED;
    if fraction < Decimal::ZERO || fraction > Decimal::ONE {
        return Err(malformed_numeric(field, value));
    }
    Ok(fraction)
}

/// `"05/03/2022"` (day/month/year) -> 2022-03-05
pub fn parse_invoice_date(value: &str) -> Result<NaiveDate, NormalizeError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        NormalizeError::MalformedDateField {
            field: "Invoice_Date",
            value: value.to_string(),
        }
    })
}
