//! In-memory sales store.
//!
//! Mirrors the PostgreSQL store closely enough for the pipeline to run
//! against it: per-table key sequences that are never rolled back, a
//! working copy that only becomes the committed copy on `commit`, natural
//! key uniqueness, and foreign-key checks on fact inserts. Failures can be
//! injected to exercise the pipeline's recovery paths.

use async_trait::async_trait;
use std::collections::HashSet;

use super::{DimensionStore, FactStore, KeyMap, SalesStore, SurrogateKey};
use crate::dimension::{Location, Product, Retailer};
use crate::error::StoreError;
use crate::fact::SalesFact;

/// Table contents at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub retailers: Vec<(SurrogateKey, Retailer)>,
    pub products: Vec<(SurrogateKey, Product)>,
    pub locations: Vec<(SurrogateKey, Location)>,
    pub facts: Vec<SalesFact>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    working: Snapshot,
    committed: Snapshot,
    next_retailer: SurrogateKey,
    next_product: SurrogateKey,
    next_location: SurrogateKey,
    rejected_products: HashSet<String>,
    failing_batches: usize,
    offline: bool,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upsert of this product name fails with an insert error.
    pub fn reject_product(&mut self, name: &str) {
        self.rejected_products.insert(name.to_string());
    }

    /// The next `count` fact batches fail with an insert error.
    pub fn fail_next_batches(&mut self, count: usize) {
        self.failing_batches = count;
    }

    /// Every later operation fails as if the connection dropped.
    pub fn go_offline(&mut self) {
        self.offline = true;
    }

    /// What the open transaction sees.
    pub fn working(&self) -> &Snapshot {
        &self.working
    }

    /// What a fresh connection would see.
    pub fn committed(&self) -> &Snapshot {
        &self.committed
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::connection("in-memory store is offline"));
        }
        Ok(())
    }
}

fn next(sequence: &mut SurrogateKey) -> SurrogateKey {
    *sequence += 1;
    *sequence
}

#[async_trait]
impl DimensionStore<Retailer> for MemoryStore {
    async fn fetch_existing(&mut self) -> Result<KeyMap<(i32, String)>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .working
            .retailers
            .iter()
            .map(|(id, r)| ((r.retailer_id, r.retailer_name.clone()), *id))
            .collect())
    }

    async fn upsert(&mut self, value: &Retailer) -> Result<(), StoreError> {
        self.ensure_online()?;
        // guarded insert: an existing natural key is left as is
        if self.working.retailers.iter().any(|(_, r)| r == value) {
            return Ok(());
        }
        let id = next(&mut self.next_retailer);
        self.working.retailers.push((id, value.clone()));
        Ok(())
    }
}

#[async_trait]
impl DimensionStore<Product> for MemoryStore {
    async fn fetch_existing(&mut self) -> Result<KeyMap<String>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .working
            .products
            .iter()
            .map(|(id, p)| (p.product_name.clone(), *id))
            .collect())
    }

    async fn upsert(&mut self, value: &Product) -> Result<(), StoreError> {
        self.ensure_online()?;
        if self.rejected_products.contains(&value.product_name) {
            return Err(StoreError::insert(format!(
                "product '{}' rejected",
                value.product_name
            )));
        }
        match self
            .working
            .products
            .iter_mut()
            .find(|(_, p)| p.product_name == value.product_name)
        {
            Some((_, existing)) => existing.price_per_unit = value.price_per_unit,
            None => {
                let id = next(&mut self.next_product);
                self.working.products.push((id, value.clone()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DimensionStore<Location> for MemoryStore {
    async fn fetch_existing(&mut self) -> Result<KeyMap<(String, String, String)>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .working
            .locations
            .iter()
            .map(|(id, l)| ((l.city.clone(), l.state.clone(), l.region.clone()), *id))
            .collect())
    }

    async fn upsert(&mut self, value: &Location) -> Result<(), StoreError> {
        self.ensure_online()?;
        match self.working.locations.iter_mut().find(|(_, l)| *l == *value) {
            Some((_, existing)) => *existing = value.clone(),
            None => {
                let id = next(&mut self.next_location);
                self.working.locations.push((id, value.clone()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FactStore for MemoryStore {
    async fn insert_batch(&mut self, facts: &[SalesFact]) -> Result<u64, StoreError> {
        self.ensure_online()?;
        if self.failing_batches > 0 {
            self.failing_batches -= 1;
            return Err(StoreError::insert("injected batch failure"));
        }

        let has = |keys: &[SurrogateKey], key: SurrogateKey| keys.contains(&key);
        let retailers: Vec<_> = self.working.retailers.iter().map(|(id, _)| *id).collect();
        let products: Vec<_> = self.working.products.iter().map(|(id, _)| *id).collect();
        let locations: Vec<_> = self.working.locations.iter().map(|(id, _)| *id).collect();
        if let Some(orphan) = facts.iter().find(|f| {
            !has(&retailers, f.retailer_entry_id)
                || !has(&products, f.product_id)
                || !has(&locations, f.location_id)
        }) {
            return Err(StoreError::insert(format!(
                "foreign key violation: retailer={} product={} location={}",
                orphan.retailer_entry_id, orphan.product_id, orphan.location_id
            )));
        }

        self.working.facts.extend_from_slice(facts);
        Ok(facts.len() as u64)
    }
}

#[async_trait]
impl SalesStore for MemoryStore {
    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.committed = self.working.clone();
        self.commits += 1;
        Ok(())
    }

    async fn close(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn fact(retailer: SurrogateKey, product: SurrogateKey, location: SurrogateKey) -> SalesFact {
        SalesFact {
            invoice_date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            units_sold: 1,
            total_sales: Decimal::from(10),
            operating_profit: Decimal::from(3),
            operating_margin: Decimal::new(3, 1),
            sales_method: "Outlet".to_string(),
            retailer_entry_id: retailer,
            product_id: product,
            location_id: location,
        }
    }

    async fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .upsert(&Retailer {
                retailer_id: 1,
                retailer_name: "Amazon".to_string(),
            })
            .await
            .unwrap();
        store
            .upsert(&Product {
                product_name: "Apparel".to_string(),
                price_per_unit: Decimal::from(20),
            })
            .await
            .unwrap();
        store
            .upsert(&Location {
                city: "Boise".to_string(),
                state: "Idaho".to_string(),
                region: "West".to_string(),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_writes_are_invisible_until_commit() {
        let mut store = seeded().await;
        store.insert_batch(&[fact(1, 1, 1)]).await.unwrap();
        assert_eq!(store.working().facts.len(), 1);
        assert!(store.committed().facts.is_empty());

        store.commit().await.unwrap();
        assert_eq!(store.committed().facts.len(), 1);
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn test_fact_batch_checks_foreign_keys() {
        let mut store = seeded().await;
        let err = store
            .insert_batch(&[fact(1, 1, 1), fact(1, 9, 1)])
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        // all or nothing
        assert!(store.working().facts.is_empty());
    }

    #[tokio::test]
    async fn test_injected_batch_failures_run_out() {
        let mut store = seeded().await;
        store.fail_next_batches(1);
        assert!(store.insert_batch(&[fact(1, 1, 1)]).await.is_err());
        assert_eq!(store.insert_batch(&[fact(1, 1, 1)]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offline_store_refuses_everything() {
        let mut store = seeded().await;
        store.go_offline();
        let err = DimensionStore::<Retailer>::fetch_existing(&mut store)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Connection { .. }));
        assert!(store.commit().await.is_err());
    }
}
