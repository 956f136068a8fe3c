//! Dimension entities and their natural-key to surrogate-key resolution.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::record::CleanRecord;
use crate::store::{DimensionStore, KeyMap};

/// What an upsert does when the natural key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Leave the stored row untouched.
    Keep,
    /// Overwrite the non-key attributes.
    Refresh,
}

/// A reference entity the fact table points at by surrogate key.
pub trait Dimension: Clone + Debug + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    const NAME: &'static str;
    const ON_CONFLICT: ConflictPolicy;

    fn from_record(record: &CleanRecord) -> Self;
    fn key(&self) -> Self::Key;
}

pub type RetailerKey = (i32, String);
pub type LocationKey = (String, String, String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retailer {
    pub retailer_id: i32,
    pub retailer_name: String,
}

impl Dimension for Retailer {
    type Key = RetailerKey;
    const NAME: &'static str = "retailer";
    const ON_CONFLICT: ConflictPolicy = ConflictPolicy::Keep;

    fn from_record(record: &CleanRecord) -> Self {
        Self {
            retailer_id: record.retailer_id,
            retailer_name: record.retailer_name.clone(),
        }
    }

    fn key(&self) -> RetailerKey {
        (self.retailer_id, self.retailer_name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub product_name: String,
    pub price_per_unit: Decimal,
}

impl Dimension for Product {
    type Key = String;
    const NAME: &'static str = "product";
    const ON_CONFLICT: ConflictPolicy = ConflictPolicy::Refresh;

    fn from_record(record: &CleanRecord) -> Self {
        Self {
            product_name: record.product_name.clone(),
            price_per_unit: record.price_per_unit,
        }
    }

    fn key(&self) -> String {
        self.product_name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub city: String,
    pub state: String,
    pub region: String,
}

impl Dimension for Location {
    type Key = LocationKey;
    const NAME: &'static str = "location";
    const ON_CONFLICT: ConflictPolicy = ConflictPolicy::Refresh;

    fn from_record(record: &CleanRecord) -> Self {
        Self {
            city: record.city.clone(),
            state: record.state.clone(),
            region: record.region.clone(),
        }
    }

    fn key(&self) -> LocationKey {
        (self.city.clone(), self.state.clone(), self.region.clone())
    }
}

/// Counts from one dimension's upsert pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub distinct: usize,
    /// Skipped because the key already exists and the policy is `Keep`.
    pub already_present: usize,
    pub upserted: usize,
    pub failed: usize,
}

/// Upserts one dimension and maps its natural keys to surrogate keys.
#[derive(Debug)]
pub struct DimensionResolver<D> {
    _dimension: PhantomData<D>,
}

impl<D: Dimension> Default for DimensionResolver<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dimension> DimensionResolver<D> {
    pub fn new() -> Self {
        Self {
            _dimension: PhantomData,
        }
    }

    /// Distinct values by natural key, in first-seen order.
    ///
    /// Non-key attributes take the last value seen for the key.
    pub fn collect_distinct(&self, records: &[CleanRecord]) -> Vec<D> {
        let mut index: HashMap<D::Key, usize> = HashMap::new();
        let mut values: Vec<D> = Vec::new();
        for record in records {
            let value = D::from_record(record);
            match index.get(&value.key()) {
                Some(&pos) => values[pos] = value,
                None => {
                    index.insert(value.key(), values.len());
                    values.push(value);
                }
            }
        }
        values
    }

    pub async fn fetch_existing<S>(&self, store: &mut S) -> Result<KeyMap<D::Key>, StoreError>
    where
        S: DimensionStore<D>,
    {
        store.fetch_existing().await
    }

    /// Write `distinct` to the store according to `D::ON_CONFLICT`.
    ///
    /// A rejected row is logged and counted; only non-recoverable store
    /// errors are returned.
    pub async fn upsert<S>(
        &self,
        store: &mut S,
        distinct: &[D],
        existing: &KeyMap<D::Key>,
    ) -> Result<UpsertOutcome, StoreError>
    where
        S: DimensionStore<D>,
    {
        let mut outcome = UpsertOutcome {
            distinct: distinct.len(),
            ..UpsertOutcome::default()
        };

        for value in distinct {
            if D::ON_CONFLICT == ConflictPolicy::Keep && existing.contains_key(&value.key()) {
                outcome.already_present += 1;
                continue;
            }
            match store.upsert(value).await {
                Ok(()) => outcome.upserted += 1,
                Err(e) if e.is_recoverable() => {
                    warn!(dimension = D::NAME, key = ?value.key(), error = %e, "upsert skipped");
                    outcome.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            dimension = D::NAME,
            distinct = outcome.distinct,
            already_present = outcome.already_present,
            upserted = outcome.upserted,
            failed = outcome.failed,
            "dimension upserted"
        );
        Ok(outcome)
    }

    /// Collect, read what exists, and upsert, in one call.
    pub async fn stage<S>(
        &self,
        store: &mut S,
        records: &[CleanRecord],
    ) -> Result<UpsertOutcome, StoreError>
    where
        S: DimensionStore<D>,
    {
        let distinct = self.collect_distinct(records);
        let existing = self.fetch_existing(store).await?;
        debug!(dimension = D::NAME, existing = existing.len(), "existing keys read");
        self.upsert(store, &distinct, &existing).await
    }

    /// Re-read the table so freshly inserted rows carry their keys.
    pub async fn build_mapping<S>(&self, store: &mut S) -> Result<KeyMap<D::Key>, StoreError>
    where
        S: DimensionStore<D>,
    {
        let mapping = store.fetch_existing().await?;
        debug!(dimension = D::NAME, keys = mapping.len(), "mapping built");
        Ok(mapping)
    }
}
