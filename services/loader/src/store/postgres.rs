//! PostgreSQL sales store.
//!
//! Holds a single connection with one open transaction. Every dimension
//! upsert and every fact batch runs inside its own savepoint, so a rejected
//! row rolls back alone and the surrounding transaction stays usable.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, warn};

use super::{DimensionStore, FactStore, KeyMap, SalesStore};
use crate::dimension::{Location, LocationKey, Product, Retailer, RetailerKey};
use crate::error::StoreError;
use crate::fact::SalesFact;

const UPSERT_RETAILER: &str = r#"
    INSERT INTO retailer (retailer_id, retailer_name)
    SELECT $1, $2
    WHERE NOT EXISTS (
        SELECT 1 FROM retailer WHERE retailer_id = $1 AND retailer_name = $2
    )
"#;

const UPSERT_PRODUCT: &str = r#"
    INSERT INTO product (product_name, price_per_unit)
    VALUES ($1, $2)
    ON CONFLICT (product_name) DO UPDATE SET price_per_unit = EXCLUDED.price_per_unit
"#;

const UPSERT_LOCATION: &str = r#"
    INSERT INTO location (city, state, region)
    VALUES ($1, $2, $3)
    ON CONFLICT (city, state, region)
    DO UPDATE SET city = EXCLUDED.city, state = EXCLUDED.state, region = EXCLUDED.region
"#;

const INSERT_FACTS: &str = "INSERT INTO salestransaction (invoice_date, units_sold, total_sales, operating_profit, operating_margin, sales_method, retailer_entry_id, product_id, location_id) ";

/// Errors that mean the connection itself is gone.
fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

fn query_error(e: sqlx::Error) -> StoreError {
    if is_connection_error(&e) {
        StoreError::connection(e.to_string())
    } else {
        StoreError::query(e.to_string())
    }
}

fn insert_error(e: sqlx::Error) -> StoreError {
    if is_connection_error(&e) {
        StoreError::connection(e.to_string())
    } else {
        StoreError::insert(e.to_string())
    }
}

pub struct PgStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStore {
    /// Open the connection and start the first transaction.
    pub async fn connect(db_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(db_url)
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;
        let tx = pool
            .begin()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;
        info!("Database connected");
        Ok(Self { pool, tx: Some(tx) })
    }

    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::query("no open transaction"))
    }
}

#[async_trait]
impl DimensionStore<Retailer> for PgStore {
    async fn fetch_existing(&mut self) -> Result<KeyMap<RetailerKey>, StoreError> {
        let tx = self.tx()?;
        let rows: Vec<(i64, i32, String)> = sqlx::query_as(
            "SELECT retailer_entry_id, retailer_id, retailer_name FROM retailer",
        )
        .fetch_all(&mut **tx)
        .await
        .map_err(query_error)?;
        Ok(rows
            .into_iter()
            .map(|(entry_id, id, name)| ((id, name), entry_id))
            .collect())
    }

    async fn upsert(&mut self, value: &Retailer) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let mut savepoint = Connection::begin(&mut **tx).await.map_err(query_error)?;
        let result = sqlx::query(UPSERT_RETAILER)
            .bind(value.retailer_id)
            .bind(&value.retailer_name)
            .execute(&mut *savepoint)
            .await;
        match result {
            Ok(done) => {
                savepoint.commit().await.map_err(query_error)?;
                debug!(retailer = %value.retailer_name, rows = done.rows_affected(), "retailer upserted");
                Ok(())
            }
            Err(e) => {
                savepoint.rollback().await.map_err(query_error)?;
                Err(insert_error(e))
            }
        }
    }
}

#[async_trait]
impl DimensionStore<Product> for PgStore {
    async fn fetch_existing(&mut self) -> Result<KeyMap<String>, StoreError> {
        let tx = self.tx()?;
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT product_id, product_name FROM product")
                .fetch_all(&mut **tx)
                .await
                .map_err(query_error)?;
        Ok(rows.into_iter().map(|(id, name)| (name, id)).collect())
    }

    async fn upsert(&mut self, value: &Product) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let mut savepoint = Connection::begin(&mut **tx).await.map_err(query_error)?;
        let result = sqlx::query(UPSERT_PRODUCT)
            .bind(&value.product_name)
            .bind(value.price_per_unit)
            .execute(&mut *savepoint)
            .await;
        match result {
            Ok(_) => savepoint.commit().await.map_err(query_error),
            Err(e) => {
                savepoint.rollback().await.map_err(query_error)?;
                Err(insert_error(e))
            }
        }
    }
}

#[async_trait]
impl DimensionStore<Location> for PgStore {
    async fn fetch_existing(&mut self) -> Result<KeyMap<LocationKey>, StoreError> {
        let tx = self.tx()?;
        let rows: Vec<(i64, String, String, String)> =
            sqlx::query_as("SELECT location_id, city, state, region FROM location")
                .fetch_all(&mut **tx)
                .await
                .map_err(query_error)?;
        Ok(rows
            .into_iter()
            .map(|(id, city, state, region)| ((city, state, region), id))
            .collect())
    }

    async fn upsert(&mut self, value: &Location) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let mut savepoint = Connection::begin(&mut **tx).await.map_err(query_error)?;
        let result = sqlx::query(UPSERT_LOCATION)
            .bind(&value.city)
            .bind(&value.state)
            .bind(&value.region)
            .execute(&mut *savepoint)
            .await;
        match result {
            Ok(_) => savepoint.commit().await.map_err(query_error),
            Err(e) => {
                savepoint.rollback().await.map_err(query_error)?;
                Err(insert_error(e))
            }
        }
    }
}

#[async_trait]
impl FactStore for PgStore {
    async fn insert_batch(&mut self, facts: &[SalesFact]) -> Result<u64, StoreError> {
        if facts.is_empty() {
            return Ok(0);
        }
        let tx = self.tx()?;
        let mut savepoint = Connection::begin(&mut **tx).await.map_err(query_error)?;

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(INSERT_FACTS);
        qb.push_values(facts.iter(), |mut b, fact| {
            b.push_bind(fact.invoice_date)
                .push_bind(fact.units_sold)
                .push_bind(fact.total_sales)
                .push_bind(fact.operating_profit)
                .push_bind(fact.operating_margin)
                .push_bind(&fact.sales_method)
                .push_bind(fact.retailer_entry_id)
                .push_bind(fact.product_id)
                .push_bind(fact.location_id);
        });

        let result = qb.build().execute(&mut *savepoint).await;
        match result {
            Ok(done) => {
                savepoint.commit().await.map_err(query_error)?;
                Ok(done.rows_affected())
            }
            Err(e) => {
                savepoint.rollback().await.map_err(query_error)?;
                Err(insert_error(e))
            }
        }
    }
}

#[async_trait]
impl SalesStore for PgStore {
    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::query("no open transaction"))?;
        tx.commit().await.map_err(query_error)?;
        self.tx = Some(self.pool.begin().await.map_err(query_error)?);
        Ok(())
    }

    async fn close(mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "rollback on close failed");
            }
        }
        self.pool.close().await;
        info!("Database connection closed");
        Ok(())
    }
}
