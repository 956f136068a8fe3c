//! Store ports for the four sales tables.
//!
//! The pipeline only talks to the store through these traits, so the same
//! code runs against PostgreSQL (`postgres`) or the in-memory store
//! (`memory`) used by tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::dimension::{Dimension, Location, Product, Retailer};
use crate::error::StoreError;
use crate::fact::SalesFact;

pub mod memory;
pub mod postgres;

/// Store-generated identifier referenced by the fact table.
pub type SurrogateKey = i64;

/// Natural key to surrogate key.
pub type KeyMap<K> = HashMap<K, SurrogateKey>;

/// Reads and writes one dimension table.
#[async_trait]
pub trait DimensionStore<D: Dimension>: Send {
    /// Every row currently visible, keyed by natural key.
    async fn fetch_existing(&mut self) -> Result<KeyMap<D::Key>, StoreError>;

    /// Insert `value`, resolving a natural-key conflict per `D::ON_CONFLICT`.
    ///
    /// A failure affects this row only; the store stays usable.
    async fn upsert(&mut self, value: &D) -> Result<(), StoreError>;
}

/// Writes to the fact table.
#[async_trait]
pub trait FactStore: Send {
    /// Insert `facts` in one request. All or nothing; returns rows written.
    async fn insert_batch(&mut self, facts: &[SalesFact]) -> Result<u64, StoreError>;
}

/// The full store a pipeline run works against.
#[async_trait]
pub trait SalesStore:
    DimensionStore<Retailer> + DimensionStore<Product> + DimensionStore<Location> + FactStore
{
    /// Make everything written so far durable and visible.
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Release the connection. Uncommitted work is discarded.
    async fn close(self) -> Result<(), StoreError>
    where
        Self: Sized;
}
