use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use shopfloor_infra::config::{AppConfig, StorageConfig};
use shopfloor_infra::seed::{SeedData, SeedError};
use shopfloor_infra::storage::{InMemoryStorage, PostgresStorage, StorageError};
use shopfloor_infra::{OrderDetails, OrderResult, OrderService, OrderingError, PlaceOrder};
use shopfloor_core::Money;
use shopfloor_parties::CustomerId;
use shopfloor_products::ProductId;
use shopfloor_sales::{LineItem, Order, OrderId};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Seed(#[from] SeedError),
}

/// Ordering workflow wired to one concrete backend.
#[derive(Clone)]
pub enum AppServices {
    InMemory {
        orders: Arc<OrderService<InMemoryStorage>>,
        storage: InMemoryStorage,
    },
    Postgres {
        orders: Arc<OrderService<PostgresStorage>>,
        storage: PostgresStorage,
    },
}

// Forward a call to whichever backend is configured.
macro_rules! with_orders {
    ($services:expr, $orders:ident => $body:expr) => {
        match $services {
            AppServices::InMemory { orders: $orders, .. } => $body,
            AppServices::Postgres { orders: $orders, .. } => $body,
        }
    };
}

impl AppServices {
    pub fn in_memory(storage: InMemoryStorage, operation_timeout: Duration) -> Self {
        AppServices::InMemory {
            orders: Arc::new(OrderService::new(storage.clone(), operation_timeout)),
            storage,
        }
    }

    pub fn postgres(storage: PostgresStorage, operation_timeout: Duration) -> Self {
        AppServices::Postgres {
            orders: Arc::new(OrderService::new(storage.clone(), operation_timeout)),
            storage,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "in_memory",
            AppServices::Postgres { .. } => "postgres",
        }
    }

    /// The in-memory store, for seeding and inspection in tests.
    pub fn in_memory_storage(&self) -> Option<&InMemoryStorage> {
        match self {
            AppServices::InMemory { storage, .. } => Some(storage),
            AppServices::Postgres { .. } => None,
        }
    }

    /// Whether the backend can currently serve requests.
    pub async fn ping(&self) -> Result<(), StorageError> {
        match self {
            AppServices::InMemory { .. } => Ok(()),
            AppServices::Postgres { storage, .. } => storage.ping().await,
        }
    }

    pub async fn place_order(&self, request: PlaceOrder) -> Result<OrderResult, OrderingError> {
        with_orders!(self, orders => orders.place_order(request).await)
    }

    pub async fn add_item(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<LineItem, OrderingError> {
        with_orders!(self, orders => orders.add_item(order_id, product_id, quantity).await)
    }

    pub async fn finalize(&self, order_id: OrderId) -> Result<Money, OrderingError> {
        with_orders!(self, orders => orders.finalize(order_id).await)
    }

    pub async fn order_details(&self, order_id: OrderId) -> Result<OrderDetails, OrderingError> {
        with_orders!(self, orders => orders.order_details(order_id).await)
    }

    pub async fn list_orders(
        &self,
        customer_id: Option<CustomerId>,
    ) -> Result<Vec<Order>, OrderingError> {
        with_orders!(self, orders => orders.list_orders(customer_id).await)
    }

    pub async fn check_available(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<bool, OrderingError> {
        with_orders!(self, orders => orders.check_available(product_id, quantity).await)
    }
}

/// Build services from configuration: connect, create the schema, seed.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StartupError> {
    let seed = config.seed_path.as_ref().map(SeedData::load).transpose()?;

    match &config.storage {
        StorageConfig::InMemory => {
            tracing::info!("using in-memory storage");
            let storage = InMemoryStorage::new();
            if let Some(seed) = &seed {
                seed.apply_in_memory(&storage)?;
            }
            Ok(AppServices::in_memory(storage, config.operation_timeout))
        }
        StorageConfig::Postgres {
            database_url,
            max_connections,
            lock_timeout,
        } => {
            tracing::info!(max_connections = *max_connections, "using postgres storage");
            let storage = PostgresStorage::connect(database_url, *max_connections, *lock_timeout).await?;
            storage.ensure_schema().await?;
            if let Some(seed) = &seed {
                seed.apply_postgres(&storage).await?;
            }
            Ok(AppServices::postgres(storage, config.operation_timeout))
        }
    }
}
