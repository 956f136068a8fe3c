//! Fact rows for `salestransaction` and their foreign-key resolution.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use crate::dimension::{Dimension, Location, LocationKey, Retailer, RetailerKey};
use crate::record::CleanRecord;
use crate::store::{KeyMap, SurrogateKey};

/// A sales transaction ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesFact {
    pub invoice_date: NaiveDate,
    pub units_sold: i32,
    pub total_sales: Decimal,
    pub operating_profit: Decimal,
    pub operating_margin: Decimal,
    pub sales_method: String,
    pub retailer_entry_id: SurrogateKey,
    pub product_id: SurrogateKey,
    pub location_id: SurrogateKey,
}

/// Which lookup missed for a dropped record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedForeignKey {
    Retailer,
    Product,
    Location,
}

#[derive(Debug, Default)]
pub struct FactAssembly {
    pub facts: Vec<SalesFact>,
    pub unresolved: usize,
}

/// Joins sampled records against the three dimension mappings.
#[derive(Debug)]
pub struct FactAssembler<'a> {
    pub retailers: &'a KeyMap<RetailerKey>,
    pub products: &'a KeyMap<String>,
    pub locations: &'a KeyMap<LocationKey>,
}

impl FactAssembler<'_> {
    pub fn resolve(&self, record: &CleanRecord) -> Result<SalesFact, UnresolvedForeignKey> {
        let retailer_entry_id = *self
            .retailers
            .get(&Retailer::from_record(record).key())
            .ok_or(UnresolvedForeignKey::Retailer)?;
        let product_id = *self
            .products
            .get(&record.product_name)
            .ok_or(UnresolvedForeignKey::Product)?;
        let location_id = *self
            .locations
            .get(&Location::from_record(record).key())
            .ok_or(UnresolvedForeignKey::Location)?;

        Ok(SalesFact {
            invoice_date: record.invoice_date,
            units_sold: record.units_sold,
            total_sales: record.total_sales,
            operating_profit: record.operating_profit,
            operating_margin: record.operating_margin,
            sales_method: record.sales_method.clone(),
            retailer_entry_id,
            product_id,
            location_id,
        })
    }

    /// Resolve every record, dropping (and counting) the ones that miss.
    pub fn assemble(&self, records: &[CleanRecord]) -> FactAssembly {
        let mut out = FactAssembly::default();
        for record in records {
            match self.resolve(record) {
                Ok(fact) => out.facts.push(fact),
                Err(missing) => {
                    debug!(
                        ?missing,
                        retailer = %record.retailer_name,
                        product = %record.product_name,
                        city = %record.city,
                        "fact dropped"
                    );
                    out.unresolved += 1;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(retailer: &str, product: &str, city: &str) -> CleanRecord {
        CleanRecord {
            retailer_id: 7,
            retailer_name: retailer.to_string(),
            product_name: product.to_string(),
            price_per_unit: Decimal::from(10),
            invoice_date: NaiveDate::from_ymd_opt(2021, 3, 9).unwrap(),
            units_sold: 5,
            total_sales: Decimal::from(50),
            operating_profit: Decimal::from(20),
            operating_margin: Decimal::new(4, 1),
            sales_method: "Online".to_string(),
            city: city.to_string(),
            state: "Texas".to_string(),
            region: "South".to_string(),
        }
    }

    fn maps() -> (KeyMap<RetailerKey>, KeyMap<String>, KeyMap<LocationKey>) {
        let retailers = KeyMap::from([((7, "Walmart".to_string()), 11)]);
        let products = KeyMap::from([("Apparel".to_string(), 21)]);
        let locations = KeyMap::from([(
            ("Houston".to_string(), "Texas".to_string(), "South".to_string()),
            31,
        )]);
        (retailers, products, locations)
    }

    #[test]
    fn test_resolves_all_three_keys() {
        let (retailers, products, locations) = maps();
        let assembler = FactAssembler {
            retailers: &retailers,
            products: &products,
            locations: &locations,
        };
        let fact = assembler.resolve(&record("Walmart", "Apparel", "Houston")).unwrap();
        assert_eq!(fact.retailer_entry_id, 11);
        assert_eq!(fact.product_id, 21);
        assert_eq!(fact.location_id, 31);
        assert_eq!(fact.units_sold, 5);
        assert_eq!(fact.sales_method, "Online");
    }

    #[test]
    fn test_reports_which_key_missed() {
        let (retailers, products, locations) = maps();
        let assembler = FactAssembler {
            retailers: &retailers,
            products: &products,
            locations: &locations,
        };
        assert_eq!(
            assembler.resolve(&record("Kohl's", "Apparel", "Houston")),
            Err(UnresolvedForeignKey::Retailer)
        );
        assert_eq!(
            assembler.resolve(&record("Walmart", "Footwear", "Houston")),
            Err(UnresolvedForeignKey::Product)
        );
        assert_eq!(
            assembler.resolve(&record("Walmart", "Apparel", "Dallas")),
            Err(UnresolvedForeignKey::Location)
        );
    }

    #[test]
    fn test_assemble_counts_dropped_rows() {
        let (retailers, products, locations) = maps();
        let assembler = FactAssembler {
            retailers: &retailers,
            products: &products,
            locations: &locations,
        };
        let rows = vec![
            record("Walmart", "Apparel", "Houston"),
            record("Walmart", "Footwear", "Houston"),
            record("Walmart", "Apparel", "Houston"),
            record("Walmart", "Apparel", "Austin"),
        ];
        let out = assembler.assemble(&rows);
        assert_eq!(out.facts.len(), 2);
        assert_eq!(out.unresolved, 2);
    }
}
