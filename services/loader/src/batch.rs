//! Batched fact inserts that tolerate failed batches.

use tracing::{info, warn};

use crate::error::StoreError;
use crate::fact::SalesFact;
use crate::store::FactStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub attempted: usize,
    pub inserted: u64,
    pub failed_batches: usize,
    pub failed_rows: usize,
}

/// Splits facts into batches and sends each batch as one request.
#[derive(Debug, Clone, Copy)]
pub struct BatchLoader {
    batch_size: usize,
}

impl BatchLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Insert every batch, continuing past rejected ones. No retries.
    ///
    /// Only a non-recoverable store error stops the load.
    pub async fn load<S: FactStore>(
        &self,
        store: &mut S,
        facts: &[SalesFact],
    ) -> Result<LoadOutcome, StoreError> {
        let mut outcome = LoadOutcome {
            attempted: facts.len(),
            ..LoadOutcome::default()
        };

        for (batch_num, batch) in facts.chunks(self.batch_size).enumerate() {
            match store.insert_batch(batch).await {
                Ok(rows) => {
                    info!(batch = batch_num + 1, rows, "batch inserted");
                    outcome.inserted += rows;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(batch = batch_num + 1, size = batch.len(), error = %e, "batch not inserted");
                    outcome.failed_batches += 1;
                    outcome.failed_rows += batch.len();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{Location, Product, Retailer};
    use crate::store::memory::MemoryStore;
    use crate::store::DimensionStore;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    async fn store_with_dimensions() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .upsert(&Retailer {
                retailer_id: 1,
                retailer_name: "Sports Direct".to_string(),
            })
            .await
            .unwrap();
        store
            .upsert(&Product {
                product_name: "Women's Athletic Footwear".to_string(),
                price_per_unit: Decimal::from(45),
            })
            .await
            .unwrap();
        store
            .upsert(&Location {
                city: "Miami".to_string(),
                state: "Florida".to_string(),
                region: "Southeast".to_string(),
            })
            .await
            .unwrap();
        store
    }

    fn facts(count: usize) -> Vec<SalesFact> {
        (0..count)
            .map(|n| SalesFact {
                invoice_date: NaiveDate::from_ymd_opt(2021, 2, 1).unwrap(),
                units_sold: n as i32,
                total_sales: Decimal::from(100),
                operating_profit: Decimal::from(40),
                operating_margin: Decimal::new(4, 1),
                sales_method: "Online".to_string(),
                retailer_entry_id: 1,
                product_id: 1,
                location_id: 1,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_load_in_batches() {
        let mut store = store_with_dimensions().await;
        let outcome = BatchLoader::new(2).load(&mut store, &facts(5)).await.unwrap();
        assert_eq!(outcome.attempted, 5);
        assert_eq!(outcome.inserted, 5);
        assert_eq!(outcome.failed_batches, 0);
        assert_eq!(store.working().facts.len(), 5);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_the_load() {
        let mut store = store_with_dimensions().await;
        store.fail_next_batches(1);
        let outcome = BatchLoader::new(2).load(&mut store, &facts(5)).await.unwrap();
        assert_eq!(outcome.failed_batches, 1);
        assert_eq!(outcome.failed_rows, 2);
        assert_eq!(outcome.inserted, 3);
        // the first batch is lost as a whole
        assert_eq!(store.working().facts[0].units_sold, 2);
    }

    #[tokio::test]
    async fn test_connection_loss_is_returned() {
        let mut store = store_with_dimensions().await;
        store.go_offline();
        let err = BatchLoader::new(10).load(&mut store, &facts(3)).await.unwrap_err();
        assert!(matches!(err, StoreError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_clamped() {
        let mut store = store_with_dimensions().await;
        let outcome = BatchLoader::new(0).load(&mut store, &facts(2)).await.unwrap();
        assert_eq!(outcome.inserted, 2);
    }

    #[tokio::test]
    async fn test_nothing_to_load() {
        let mut store = store_with_dimensions().await;
        let outcome = BatchLoader::new(10).load(&mut store, &[]).await.unwrap();
        assert_eq!(outcome, LoadOutcome::default());
    }
}
