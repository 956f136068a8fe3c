//! Deduplication and stratified sampling over categorical fields.
//!
//! Both stages are DETERMINISTIC: same input + same seed = same output.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashSet};

use crate::record::CleanRecord;

/// A categorical column used for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoricalField {
    SalesMethod,
    Region,
    State,
    ProductName,
}

impl CategoricalField {
    pub fn value<'a>(&self, record: &'a CleanRecord) -> &'a str {
        match self {
            Self::SalesMethod => &record.sales_method,
            Self::Region => &record.region,
            Self::State => &record.state,
            Self::ProductName => &record.product_name,
        }
    }
}

/// The grouping used by both deduplication and sampling.
pub const CATEGORICAL_FIELDS: [CategoricalField; 4] = [
    CategoricalField::SalesMethod,
    CategoricalField::Region,
    CategoricalField::State,
    CategoricalField::ProductName,
];

fn group_key<'a>(fields: &[CategoricalField], record: &'a CleanRecord) -> Vec<&'a str> {
    fields.iter().map(|f| f.value(record)).collect()
}

/// Keeps the first record for each distinct tuple of categorical values.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    fields: Vec<CategoricalField>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(&CATEGORICAL_FIELDS)
    }
}

impl Deduplicator {
    pub fn new(fields: &[CategoricalField]) -> Self {
        Self {
            fields: fields.to_vec(),
        }
    }

    pub fn deduplicate(&self, records: Vec<CleanRecord>) -> Vec<CleanRecord> {
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        records
            .into_iter()
            .filter(|record| {
                let key: Vec<String> = group_key(&self.fields, record)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                seen.insert(key)
            })
            .collect()
    }
}

/// One-per-group floor, then a seeded random top-up to the target size.
#[derive(Debug, Clone)]
pub struct StratifiedSampler {
    target: usize,
    seed: u64,
    fields: Vec<CategoricalField>,
}

impl StratifiedSampler {
    pub fn new(target: usize, seed: u64) -> Self {
        Self {
            target,
            seed,
            fields: CATEGORICAL_FIELDS.to_vec(),
        }
    }

    pub fn with_fields(mut self, fields: &[CategoricalField]) -> Self {
        self.fields = fields.to_vec();
        self
    }

    /// Draw the sample.
    ///
    /// Groups are visited in sorted key order, so the floor picks come out
    /// in that order, followed by the top-up picks. When there are more
    /// groups than `target` every group still contributes one record.
    pub fn sample(&self, records: &[CleanRecord]) -> Vec<CleanRecord> {
        // BTreeMap for deterministic group ordering
        let mut groups: BTreeMap<Vec<&str>, Vec<usize>> = BTreeMap::new();
        for (idx, record) in records.iter().enumerate() {
            groups
                .entry(group_key(&self.fields, record))
                .or_default()
                .push(idx);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let capacity = groups.len().max(self.target.min(records.len()));
        let mut selected: Vec<usize> = Vec::with_capacity(capacity);
        for members in groups.values() {
            let pick = members[rng.gen_range(0..members.len())];
            selected.push(pick);
        }

        if selected.len() < self.target {
            let needed = self.target - selected.len();
            let taken: HashSet<usize> = selected.iter().copied().collect();
            let pool: Vec<usize> = (0..records.len()).filter(|i| !taken.contains(i)).collect();

            let mut rng = StdRng::seed_from_u64(self.seed);
            selected.extend(pool.choose_multiple(&mut rng, needed).copied());
        }

        selected.into_iter().map(|i| records[i].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn record(method: &str, region: &str, state: &str, product: &str, units: i32) -> CleanRecord {
        CleanRecord {
            retailer_id: 1,
            retailer_name: "Walmart".to_string(),
            product_name: product.to_string(),
            price_per_unit: Decimal::from(10),
            invoice_date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            units_sold: units,
            total_sales: Decimal::from(100),
            operating_profit: Decimal::from(30),
            operating_margin: Decimal::new(3, 1),
            sales_method: method.to_string(),
            city: "Houston".to_string(),
            state: state.to_string(),
            region: region.to_string(),
        }
    }

    /// `groups` distinct groups with `per_group` records each.
    fn grid(groups: usize, per_group: usize) -> Vec<CleanRecord> {
        let mut out = Vec::new();
        for g in 0..groups {
            for n in 0..per_group {
                out.push(record("Online", "South", "Texas", &format!("P{g}"), n as i32));
            }
        }
        out
    }

    // -------------------------------------------------------------------------
    // DEDUPLICATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let rows = vec![
            record("Online", "South", "Texas", "Apparel", 10),
            record("Online", "South", "Texas", "Apparel", 99),
        ];
        let out = Deduplicator::default().deduplicate(rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].units_sold, 10);
    }

    #[test]
    fn test_dedup_requires_all_fields_equal() {
        let rows = vec![
            record("Online", "South", "Texas", "Apparel", 1),
            record("Outlet", "South", "Texas", "Apparel", 2),
            record("Online", "West", "Texas", "Apparel", 3),
            record("Online", "South", "Utah", "Apparel", 4),
            record("Online", "South", "Texas", "Footwear", 5),
        ];
        let out = Deduplicator::default().deduplicate(rows);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_dedup_custom_fields() {
        let rows = vec![
            record("Online", "South", "Texas", "Apparel", 1),
            record("Outlet", "South", "Utah", "Footwear", 2),
        ];
        let out = Deduplicator::new(&[CategoricalField::Region]).deduplicate(rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].units_sold, 1);
    }

    // -------------------------------------------------------------------------
    // SAMPLING
    // -------------------------------------------------------------------------

    #[test]
    fn test_sample_floor_and_top_up() {
        let rows = grid(4, 10);
        let sample = StratifiedSampler::new(25, 1).sample(&rows);
        assert_eq!(sample.len(), 25);

        let products: HashSet<&str> = sample.iter().map(|r| r.product_name.as_str()).collect();
        assert_eq!(products.len(), 4);
    }

    #[test]
    fn test_sample_has_no_repeats() {
        let rows = grid(3, 5);
        let sample = StratifiedSampler::new(15, 7).sample(&rows);
        let distinct: HashSet<(String, i32)> = sample
            .iter()
            .map(|r| (r.product_name.clone(), r.units_sold))
            .collect();
        assert_eq!(distinct.len(), 15);
    }

    #[test]
    fn test_sample_stops_when_pool_exhausted() {
        let rows = grid(2, 3);
        let sample = StratifiedSampler::new(500, 1).sample(&rows);
        assert_eq!(sample.len(), 6);
    }

    #[test]
    fn test_sample_floor_exceeds_target() {
        let rows = grid(8, 2);
        let sample = StratifiedSampler::new(5, 1).sample(&rows);
        assert_eq!(sample.len(), 8);
    }

    #[test]
    fn test_sample_determinism() {
        let rows = grid(5, 20);
        let baseline = StratifiedSampler::new(40, 1).sample(&rows);
        for _ in 0..10 {
            assert_eq!(StratifiedSampler::new(40, 1).sample(&rows), baseline);
        }
    }

    #[test]
    fn test_sample_groups_in_sorted_order() {
        let rows = vec![
            record("Online", "South", "Texas", "Zeta", 1),
            record("Online", "South", "Texas", "Alpha", 2),
        ];
        let sample = StratifiedSampler::new(2, 1).sample(&rows);
        assert_eq!(sample[0].product_name, "Alpha");
        assert_eq!(sample[1].product_name, "Zeta");
    }

    #[test]
    fn test_sample_custom_grouping() {
        let rows = grid(6, 2);
        let sample = StratifiedSampler::new(3, 1)
            .with_fields(&[CategoricalField::Region])
            .sample(&rows);
        assert_eq!(sample.len(), 3);
    }

    #[test]
    fn test_sample_unbounded_target() {
        let rows = grid(1, 1);
        let sample = StratifiedSampler::new(usize::MAX, 1).sample(&rows);
        assert_eq!(sample.len(), 1);
    }

    #[test]
    fn test_sample_empty_input() {
        assert!(StratifiedSampler::new(10, 1).sample(&[]).is_empty());
    }
}
