//! Postgres-backed storage.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StorageError | Scenario |
//! |------------|----------------------|--------------|----------|
//! | Database (lock not available) | `55P03` | `Timeout` | `lock_timeout` expired waiting for a row lock |
//! | Database (query canceled) | `57014` | `Timeout` | statement cancelled |
//! | Database (integrity) | `23xxx` | `Constraint` | check, unique or foreign key violation |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolTimedOut / PoolClosed / Io | N/A | `Connection` | no usable connection |
//! | ColumnDecode / Decode | N/A | `Decode` | row does not match the domain types |
//!
//! ## Locking
//!
//! Every transaction sets `lock_timeout`, so a blocked row lock surfaces as
//! `StorageError::Timeout` instead of waiting forever. Stock is taken with a
//! single conditional `UPDATE`, which is atomic per product row.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use shopfloor_core::{AggregateId, Money, Quantity, StockLevel};
use shopfloor_parties::{Customer, CustomerId, CustomerStatus};
use shopfloor_products::{CategoryId, Product, ProductId, ProductStatus};
use shopfloor_sales::{LineItem, Order, OrderId, OrderSnapshot, OrderStatus};

use super::r#trait::{StockDecrement, Storage, StorageError, StorageTx};

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const PRODUCT_COLUMNS: &str = "product_id, name, category_id, price_cents, stock_quantity, is_active";
const ORDER_COLUMNS: &str = "order_id, customer_id, shipping_address, payment_method, status, \
                             total_cents, line_count, opened_at, closed_at";

/// Postgres storage over a connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStorage {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip to the database.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Insert a product, or overwrite every column of an existing one.
    pub async fn upsert_product(&self, product: &Product) -> Result<(), StorageError> {
        let price = product
            .unit_price()
            .to_signed_cents()
            .map_err(|e| StorageError::Constraint(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO products (product_id, name, category_id, price_cents, stock_quantity, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_id) DO UPDATE SET
                name = EXCLUDED.name,
                category_id = EXCLUDED.category_id,
                price_cents = EXCLUDED.price_cents,
                stock_quantity = EXCLUDED.stock_quantity,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(*product.id_typed().0.as_uuid())
        .bind(product.name())
        .bind(product.category_id().0)
        .bind(price)
        .bind(product.available().get())
        .bind(product.status().is_active())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;
        Ok(())
    }

    /// Insert a customer, or overwrite every column of an existing one.
    pub async fn upsert_customer(&self, customer: &Customer) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO customers (customer_id, first_name, last_name, email, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (customer_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(*customer.id_typed().0.as_uuid())
        .bind(customer.first_name())
        .bind(customer.last_name())
        .bind(customer.email())
        .bind(customer.is_active())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_customer", e))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // SET does not take bind parameters; the value is an integer we own.
        let set_timeout = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(PostgresTx { tx })
    }
}

/// Transaction over [`PostgresStorage`]. Dropping it rolls back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageTx for PostgresTx {
    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>, StorageError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1");
        let row = sqlx::query(&sql)
            .bind(*id.0.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_product", e))?;
        row.map(|r| Product::try_from(decode::<ProductRow>(&r)?)).transpose()
    }

    async fn find_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StorageError> {
        let row = sqlx::query(
            "SELECT customer_id, first_name, last_name, email, is_active FROM customers WHERE customer_id = $1",
        )
        .bind(*id.0.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_customer", e))?;
        row.map(|r| Customer::try_from(decode::<CustomerRow>(&r)?)).transpose()
    }

    #[instrument(skip(self), fields(product_id = %id, quantity = %quantity), err)]
    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: Quantity,
    ) -> Result<StockDecrement, StorageError> {
        let sql = format!(
            "UPDATE products SET stock_quantity = stock_quantity - $2 \
             WHERE product_id = $1 AND is_active AND stock_quantity >= $2 \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let updated = sqlx::query(&sql)
            .bind(*id.0.as_uuid())
            .bind(quantity.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("decrement_stock", e))?;

        if let Some(row) = updated {
            let product: Product = decode::<ProductRow>(&row)?.try_into()?;
            return Ok(StockDecrement::Applied(product));
        }

        // Nothing matched: work out whether the product is missing or short.
        let current = sqlx::query("SELECT stock_quantity, is_active FROM products WHERE product_id = $1")
            .bind(*id.0.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("decrement_stock", e))?;

        match current {
            Some(row) => {
                let is_active: bool = row.try_get("is_active").map_err(decode_error)?;
                if !is_active {
                    return Ok(StockDecrement::Unavailable);
                }
                let units: i64 = row.try_get("stock_quantity").map_err(decode_error)?;
                let available =
                    StockLevel::new(units).map_err(|e| StorageError::Decode(e.to_string()))?;
                Ok(StockDecrement::Insufficient { available })
            }
            None => Ok(StockDecrement::Unavailable),
        }
    }

    #[instrument(skip(self), fields(product_id = %id, quantity = %quantity), err)]
    async fn increment_stock(
        &mut self,
        id: ProductId,
        quantity: Quantity,
    ) -> Result<Option<Product>, StorageError> {
        let sql = format!(
            "UPDATE products SET stock_quantity = stock_quantity + $2 \
             WHERE product_id = $1 RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(*id.0.as_uuid())
            .bind(quantity.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("increment_stock", e))?;
        row.map(|r| Product::try_from(decode::<ProductRow>(&r)?)).transpose()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StorageError> {
        let s = order.snapshot();
        sqlx::query(
            r#"
            INSERT INTO orders (order_id, customer_id, shipping_address, payment_method,
                                status, total_cents, line_count, opened_at, closed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*s.id.0.as_uuid())
        .bind(*s.customer_id.0.as_uuid())
        .bind(&s.shipping_address)
        .bind(&s.payment_method)
        .bind(s.status.as_str())
        .bind(signed_cents(s.total)?)
        .bind(line_count(s.line_count)?)
        .bind(s.opened_at)
        .bind(s.closed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StorageError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(*id.0.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?;
        row.map(|r| Order::try_from(decode::<OrderRow>(&r)?)).transpose()
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn read_order(
        &mut self,
        id: OrderId,
    ) -> Result<Option<(Order, Vec<LineItem>)>, StorageError> {
        // FOR SHARE waits out a writer holding FOR UPDATE and keeps the next
        // one off the row until this transaction ends, so the lines read
        // below belong to the same committed version as the header.
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1 FOR SHARE");
        let row = sqlx::query(&sql)
            .bind(*id.0.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("read_order", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let order = Order::try_from(decode::<OrderRow>(&row)?)?;
        let lines = self.line_items(id).await?;
        Ok(Some((order, lines)))
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StorageError> {
        let s = order.snapshot();
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, total_cents = $3, line_count = $4, closed_at = $5
            WHERE order_id = $1
            "#,
        )
        .bind(*s.id.0.as_uuid())
        .bind(s.status.as_str())
        .bind(signed_cents(s.total)?)
        .bind(line_count(s.line_count)?)
        .bind(s.closed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        if result.rows_affected() != 1 {
            return Err(StorageError::Backend(format!("order {} not found on update", s.id)));
        }
        Ok(())
    }

    async fn insert_line_item(&mut self, line: &LineItem) -> Result<(), StorageError> {
        let line_no = i32::try_from(line.line_no)
            .map_err(|_| StorageError::Constraint(format!("line number {} out of range", line.line_no)))?;
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, line_no, product_id, quantity, unit_price_cents, subtotal_cents)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*line.order_id.0.as_uuid())
        .bind(line_no)
        .bind(*line.product_id.0.as_uuid())
        .bind(line.quantity.get())
        .bind(signed_cents(line.unit_price)?)
        .bind(signed_cents(line.subtotal)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_line_item", e))?;
        Ok(())
    }

    async fn line_items(&mut self, order_id: OrderId) -> Result<Vec<LineItem>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, line_no, product_id, quantity, unit_price_cents, subtotal_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(*order_id.0.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("line_items", e))?;

        rows.iter()
            .map(|r| LineItem::try_from(decode::<LineItemRow>(r)?))
            .collect()
    }

    async fn list_orders(
        &mut self,
        customer_id: Option<CustomerId>,
    ) -> Result<Vec<Order>, StorageError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::uuid IS NULL OR customer_id = $1) \
             ORDER BY opened_at ASC, order_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(customer_id.map(|c| *c.0.as_uuid()))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;

        rows.iter().map(|r| Order::try_from(decode::<OrderRow>(r)?)).collect()
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn signed_cents(amount: Money) -> Result<i64, StorageError> {
    amount
        .to_signed_cents()
        .map_err(|e| StorageError::Constraint(e.to_string()))
}

fn line_count(count: u32) -> Result<i32, StorageError> {
    i32::try_from(count).map_err(|_| StorageError::Constraint(format!("line count {count} out of range")))
}

fn decode<T>(row: &PgRow) -> Result<T, StorageError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(decode_error)
}

fn decode_error(err: sqlx::Error) -> StorageError {
    StorageError::Decode(err.to_string())
}

/// Map SQLx errors to `StorageError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("57014") => StorageError::Timeout(msg),
                Some(code) if code.starts_with("23") => StorageError::Constraint(msg),
                _ => StorageError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StorageError::Connection(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StorageError::Connection(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::Io(e) => StorageError::Connection(format!("io error in {}: {}", operation, e)),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StorageError::Decode(format!("{} in {}", err, operation))
        }
        _ => StorageError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[derive(Debug)]
struct ProductRow {
    product_id: Uuid,
    name: String,
    category_id: i64,
    price_cents: i64,
    stock_quantity: i64,
    is_active: bool,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            product_id: row.try_get("product_id")?,
            name: row.try_get("name")?,
            category_id: row.try_get("category_id")?,
            price_cents: row.try_get("price_cents")?,
            stock_quantity: row.try_get("stock_quantity")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StorageError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let bad = |e: shopfloor_core::DomainError| StorageError::Decode(format!("product {}: {e}", row.product_id));
        let status = if row.is_active {
            ProductStatus::Active
        } else {
            ProductStatus::Inactive
        };
        let product = Product::new(
            ProductId::new(AggregateId::from_uuid(row.product_id)),
            row.name.clone(),
            CategoryId(row.category_id),
            Money::try_from_cents(row.price_cents).map_err(bad)?,
            StockLevel::new(row.stock_quantity).map_err(bad)?,
        )
        .map_err(bad)?;
        Ok(product.with_status(status))
    }
}

#[derive(Debug)]
struct CustomerRow {
    customer_id: Uuid,
    first_name: String,
    last_name: String,
    email: Option<String>,
    is_active: bool,
}

impl<'r> FromRow<'r, PgRow> for CustomerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CustomerRow {
            customer_id: row.try_get("customer_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

impl TryFrom<CustomerRow> for Customer {
    type Error = StorageError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let status = if row.is_active {
            CustomerStatus::Active
        } else {
            CustomerStatus::Deactivated
        };
        let customer = Customer::new(
            CustomerId::new(AggregateId::from_uuid(row.customer_id)),
            row.first_name,
            row.last_name,
            row.email,
        )
        .map_err(|e| StorageError::Decode(format!("customer {}: {e}", row.customer_id)))?;
        Ok(customer.with_status(status))
    }
}

#[derive(Debug)]
struct OrderRow {
    order_id: Uuid,
    customer_id: Uuid,
    shipping_address: String,
    payment_method: String,
    status: String,
    total_cents: i64,
    line_count: i32,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            order_id: row.try_get("order_id")?,
            customer_id: row.try_get("customer_id")?,
            shipping_address: row.try_get("shipping_address")?,
            payment_method: row.try_get("payment_method")?,
            status: row.try_get("status")?,
            total_cents: row.try_get("total_cents")?,
            line_count: row.try_get("line_count")?,
            opened_at: row.try_get("opened_at")?,
            closed_at: row.try_get("closed_at")?,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StorageError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let order_id = row.order_id;
        let status: OrderStatus = row
            .status
            .parse()
            .map_err(|e| StorageError::Decode(format!("order {order_id}: {e}")))?;
        let total = Money::try_from_cents(row.total_cents)
            .map_err(|e| StorageError::Decode(format!("order {order_id}: {e}")))?;
        let line_count = u32::try_from(row.line_count)
            .map_err(|_| StorageError::Decode(format!("order {order_id}: negative line count")))?;

        Ok(Order::restore(OrderSnapshot {
            id: OrderId::new(AggregateId::from_uuid(row.order_id)),
            customer_id: CustomerId::new(AggregateId::from_uuid(row.customer_id)),
            shipping_address: row.shipping_address,
            payment_method: row.payment_method,
            status,
            total,
            line_count,
            opened_at: row.opened_at,
            closed_at: row.closed_at,
        }))
    }
}

#[derive(Debug)]
struct LineItemRow {
    order_id: Uuid,
    line_no: i32,
    product_id: Uuid,
    quantity: i64,
    unit_price_cents: i64,
    subtotal_cents: i64,
}

impl<'r> FromRow<'r, PgRow> for LineItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LineItemRow {
            order_id: row.try_get("order_id")?,
            line_no: row.try_get("line_no")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            unit_price_cents: row.try_get("unit_price_cents")?,
            subtotal_cents: row.try_get("subtotal_cents")?,
        })
    }
}

impl TryFrom<LineItemRow> for LineItem {
    type Error = StorageError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        let bad = |what: String| StorageError::Decode(format!("order {} line {}: {what}", row.order_id, row.line_no));
        Ok(LineItem {
            order_id: OrderId::new(AggregateId::from_uuid(row.order_id)),
            line_no: u32::try_from(row.line_no).map_err(|_| bad("negative line number".to_string()))?,
            product_id: ProductId::new(AggregateId::from_uuid(row.product_id)),
            quantity: Quantity::new(row.quantity).map_err(|e| bad(e.to_string()))?,
            unit_price: Money::try_from_cents(row.unit_price_cents).map_err(|e| bad(e.to_string()))?,
            subtotal: Money::try_from_cents(row.subtotal_cents).map_err(|e| bad(e.to_string()))?,
        })
    }
}
