//! Development seed data: customers and products loaded from a JSON file.
//!
//! ```json
//! {
//!   "customers": [{ "id": "0190…", "first_name": "Ada", "last_name": "Lovelace" }],
//!   "products": [{ "id": "0190…", "name": "Widget", "category_id": 1,
//!                  "unit_price_cents": 1000, "stock_quantity": 5 }]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shopfloor_core::{AggregateId, DomainError, Money, StockLevel};
use shopfloor_parties::{Customer, CustomerId, CustomerStatus};
use shopfloor_products::{CategoryId, Product, ProductId, ProductStatus};

use crate::storage::{InMemoryStorage, PostgresStorage, StorageError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid seed record: {0}")]
    Invalid(#[from] DomainError),

    #[error("failed to store seed record: {0}")]
    Storage(#[from] StorageError),
}

fn active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedCustomer {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "active")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedProduct {
    pub id: Uuid,
    pub name: String,
    pub category_id: i64,
    pub unit_price_cents: u64,
    pub stock_quantity: i64,
    #[serde(default = "active")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub customers: Vec<SeedCustomer>,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

impl SeedData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Validate every record into domain entities.
    pub fn entities(&self) -> Result<(Vec<Customer>, Vec<Product>), SeedError> {
        let customers = self
            .customers
            .iter()
            .map(|c| {
                let status = if c.active {
                    CustomerStatus::Active
                } else {
                    CustomerStatus::Deactivated
                };
                Customer::new(
                    CustomerId::new(AggregateId::from_uuid(c.id)),
                    c.first_name.clone(),
                    c.last_name.clone(),
                    c.email.clone(),
                )
                .map(|customer| customer.with_status(status))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let products = self
            .products
            .iter()
            .map(|p| {
                let status = if p.active {
                    ProductStatus::Active
                } else {
                    ProductStatus::Inactive
                };
                Product::new(
                    ProductId::new(AggregateId::from_uuid(p.id)),
                    p.name.clone(),
                    CategoryId(p.category_id),
                    Money::from_cents(p.unit_price_cents),
                    StockLevel::new(p.stock_quantity)?,
                )
                .map(|product| product.with_status(status))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((customers, products))
    }

    pub fn apply_in_memory(&self, storage: &InMemoryStorage) -> Result<(), SeedError> {
        let (customers, products) = self.entities()?;
        for customer in customers {
            storage.insert_customer(customer)?;
        }
        for product in products {
            storage.insert_product(product)?;
        }
        tracing::info!(
            customers = self.customers.len(),
            products = self.products.len(),
            "seeded in-memory storage"
        );
        Ok(())
    }

    pub async fn apply_postgres(&self, storage: &PostgresStorage) -> Result<(), SeedError> {
        let (customers, products) = self.entities()?;
        for customer in &customers {
            storage.upsert_customer(customer).await?;
        }
        for product in &products {
            storage.upsert_product(product).await?;
        }
        tracing::info!(
            customers = customers.len(),
            products = products.len(),
            "seeded postgres storage"
        );
        Ok(())
    }
}
