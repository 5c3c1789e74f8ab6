use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use shopfloor_core::{Money, Quantity};
use shopfloor_inventory::{apply_movement, StockError, StockMovement};
use shopfloor_parties::{Customer, CustomerId, CustomerStatus};
use shopfloor_products::{Product, ProductId, ProductStatus};
use shopfloor_sales::{LineItem, Order, OrderId};

use super::r#trait::{StockDecrement, Storage, StorageError, StorageTx};

/// Operations the in-memory backend can be told to fail (once) so rollback
/// paths can be exercised.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    InsertLineItem,
    UpdateOrder,
    Commit,
}

#[derive(Debug)]
struct OrderRow {
    lock: Arc<tokio::sync::Mutex<()>>,
    order: Order,
    lines: Vec<LineItem>,
}

#[derive(Debug, Default)]
struct Tables {
    products: RwLock<HashMap<ProductId, Arc<Mutex<Product>>>>,
    customers: RwLock<HashMap<CustomerId, Customer>>,
    orders: RwLock<HashMap<OrderId, OrderRow>>,
    faults: Mutex<HashSet<FaultPoint>>,
    commit_delay: Mutex<Option<Duration>>,
}

fn poisoned() -> StorageError {
    StorageError::Backend("lock poisoned".to_string())
}

impl Tables {
    fn product_row(&self, id: ProductId) -> Result<Option<Arc<Mutex<Product>>>, StorageError> {
        let products = self.products.read().map_err(|_| poisoned())?;
        Ok(products.get(&id).cloned())
    }

    fn take_fault(&self, point: FaultPoint) -> bool {
        match self.faults.lock() {
            Ok(mut faults) => faults.remove(&point),
            Err(_) => false,
        }
    }

    fn put_back(&self, id: ProductId, quantity: Quantity) -> Result<(), StorageError> {
        let row = self
            .product_row(id)?
            .ok_or_else(|| StorageError::Backend(format!("product {id} vanished")))?;
        let mut product = row.lock().map_err(|_| poisoned())?;
        let level = apply_movement(&product, StockMovement::Release(quantity))
            .map_err(|e| StorageError::Constraint(e.to_string()))?;
        product.set_available(level);
        Ok(())
    }
}

/// In-memory transactional store.
///
/// Intended for tests/dev. Not optimized for performance.
///
/// ## Locking
///
/// - Each product row has its own mutex. A reservation takes that mutex only
///   for the check-and-decrement itself, so reservations against one product
///   are linearizable and never wait on anything else.
/// - Each order row has an async mutex that a transaction holds from
///   [`StorageTx::lock_order`] until it commits or rolls back.
///
/// ## Visibility
///
/// Order writes are staged in the transaction and applied on commit.
/// Reservations are applied immediately (that is the atomic step) and put back
/// if the transaction rolls back. Releases are deferred to commit, so rolling
/// one back never has to take units out again.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product.
    pub fn insert_product(&self, product: Product) -> Result<(), StorageError> {
        let mut products = self.tables.products.write().map_err(|_| poisoned())?;
        products.insert(product.id_typed(), Arc::new(Mutex::new(product)));
        Ok(())
    }

    /// Insert or replace a customer.
    pub fn insert_customer(&self, customer: Customer) -> Result<(), StorageError> {
        let mut customers = self.tables.customers.write().map_err(|_| poisoned())?;
        customers.insert(customer.id_typed(), customer);
        Ok(())
    }

    /// Change a catalog price. Returns `false` for an unknown product.
    pub fn set_unit_price(&self, id: ProductId, unit_price: Money) -> Result<bool, StorageError> {
        let Some(row) = self.tables.product_row(id)? else {
            return Ok(false);
        };
        row.lock().map_err(|_| poisoned())?.set_unit_price(unit_price);
        Ok(true)
    }

    pub fn set_product_status(&self, id: ProductId, status: ProductStatus) -> Result<bool, StorageError> {
        let Some(row) = self.tables.product_row(id)? else {
            return Ok(false);
        };
        row.lock().map_err(|_| poisoned())?.set_status(status);
        Ok(true)
    }

    pub fn set_customer_status(&self, id: CustomerId, status: CustomerStatus) -> Result<bool, StorageError> {
        let mut customers = self.tables.customers.write().map_err(|_| poisoned())?;
        match customers.get_mut(&id) {
            Some(c) => {
                c.set_status(status);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Committed state of a product.
    pub fn product(&self, id: ProductId) -> Result<Option<Product>, StorageError> {
        match self.tables.product_row(id)? {
            Some(row) => Ok(Some(row.lock().map_err(|_| poisoned())?.clone())),
            None => Ok(None),
        }
    }

    /// Committed state of an order and its lines.
    pub fn order(&self, id: OrderId) -> Result<Option<(Order, Vec<LineItem>)>, StorageError> {
        let orders = self.tables.orders.read().map_err(|_| poisoned())?;
        Ok(orders.get(&id).map(|row| (row.order.clone(), row.lines.clone())))
    }

    /// Make the next call at `point` fail with a backend error.
    pub fn inject_fault(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.tables.faults.lock() {
            faults.insert(point);
        }
    }

    /// Make every commit wait `delay` before it applies anything.
    #[cfg(test)]
    pub(crate) fn delay_commits(&self, delay: Duration) {
        if let Ok(mut slot) = self.tables.commit_delay.lock() {
            *slot = Some(delay);
        }
    }

    /// Overwrite a committed order header, bypassing every rule.
    #[cfg(test)]
    pub(crate) fn overwrite_order(&self, order: Order) -> Result<(), StorageError> {
        let mut orders = self.tables.orders.write().map_err(|_| poisoned())?;
        if let Some(row) = orders.get_mut(&order.id_typed()) {
            row.order = order;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        Ok(InMemoryTx {
            tables: self.tables.clone(),
            reserved: Vec::new(),
            pending_releases: Vec::new(),
            staged: HashMap::new(),
            guards: Vec::new(),
            finished: false,
        })
    }
}

#[derive(Debug)]
struct StagedOrder {
    order: Order,
    lines: Vec<LineItem>,
    is_new: bool,
}

/// Transaction over [`InMemoryStorage`].
pub struct InMemoryTx {
    tables: Arc<Tables>,
    /// Reservations already applied to product rows; put back on rollback.
    reserved: Vec<(ProductId, Quantity)>,
    /// Releases applied on commit.
    pending_releases: Vec<(ProductId, Quantity)>,
    staged: HashMap<OrderId, StagedOrder>,
    guards: Vec<OwnedMutexGuard<()>>,
    finished: bool,
}

impl InMemoryTx {
    fn staged_mut(&mut self, id: OrderId) -> Result<&mut StagedOrder, StorageError> {
        self.staged.get_mut(&id).ok_or_else(|| {
            StorageError::Backend(format!("order {id} is not locked by this transaction"))
        })
    }

    fn fail_if_injected(&self, point: FaultPoint) -> Result<(), StorageError> {
        if self.tables.take_fault(point) {
            return Err(StorageError::Backend(format!("injected fault at {point:?}")));
        }
        Ok(())
    }

    fn undo(&mut self) {
        for (id, quantity) in self.reserved.drain(..).rev() {
            if let Err(e) = self.tables.put_back(id, quantity) {
                tracing::error!(product_id = %id, quantity = quantity.get(), "failed to undo reservation: {e}");
            }
        }
        self.pending_releases.clear();
        self.staged.clear();
        self.guards.clear();
        self.finished = true;
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("in-memory transaction dropped without commit; rolling back");
            self.undo();
        }
    }
}

#[async_trait]
impl StorageTx for InMemoryTx {
    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>, StorageError> {
        match self.tables.product_row(id)? {
            Some(row) => Ok(Some(row.lock().map_err(|_| poisoned())?.clone())),
            None => Ok(None),
        }
    }

    async fn find_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StorageError> {
        let customers = self.tables.customers.read().map_err(|_| poisoned())?;
        Ok(customers.get(&id).cloned())
    }

    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: Quantity,
    ) -> Result<StockDecrement, StorageError> {
        let Some(row) = self.tables.product_row(id)? else {
            return Ok(StockDecrement::Unavailable);
        };

        let decision = {
            let mut product = row.lock().map_err(|_| poisoned())?;
            match apply_movement(&product, StockMovement::Reserve(quantity)) {
                Ok(level) => {
                    product.set_available(level);
                    Ok(StockDecrement::Applied(product.clone()))
                }
                Err(StockError::InsufficientStock { available, .. }) => {
                    Ok(StockDecrement::Insufficient { available })
                }
                Err(StockError::ProductNotFound(_)) => Ok(StockDecrement::Unavailable),
                Err(e @ StockError::Overflow(_)) => Err(StorageError::Constraint(e.to_string())),
            }
        };

        if let Ok(StockDecrement::Applied(_)) = &decision {
            self.reserved.push((id, quantity));
        }
        decision
    }

    async fn increment_stock(
        &mut self,
        id: ProductId,
        quantity: Quantity,
    ) -> Result<Option<Product>, StorageError> {
        let Some(row) = self.tables.product_row(id)? else {
            return Ok(None);
        };

        // Already-pending releases for this product count toward the preview.
        let pending: i64 = self
            .pending_releases
            .iter()
            .filter(|(p, _)| *p == id)
            .map(|(_, q)| q.get())
            .sum();

        let mut preview = row.lock().map_err(|_| poisoned())?.clone();
        let total = Quantity::new(pending + quantity.get())
            .map_err(|e| StorageError::Constraint(e.to_string()))?;
        let level = apply_movement(&preview, StockMovement::Release(total))
            .map_err(|e| StorageError::Constraint(e.to_string()))?;
        preview.set_available(level);

        self.pending_releases.push((id, quantity));
        Ok(Some(preview))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StorageError> {
        let id = order.id_typed();
        let exists = {
            let orders = self.tables.orders.read().map_err(|_| poisoned())?;
            orders.contains_key(&id)
        };
        if exists || self.staged.contains_key(&id) {
            return Err(StorageError::Constraint(format!("order {id} already exists")));
        }

        self.staged.insert(
            id,
            StagedOrder {
                order: order.clone(),
                lines: Vec::new(),
                is_new: true,
            },
        );
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StorageError> {
        if let Some(staged) = self.staged.get(&id) {
            return Ok(Some(staged.order.clone()));
        }

        let lock = {
            let orders = self.tables.orders.read().map_err(|_| poisoned())?;
            match orders.get(&id) {
                Some(row) => row.lock.clone(),
                None => return Ok(None),
            }
        };

        let guard = lock.lock_owned().await;

        let (order, lines) = {
            let orders = self.tables.orders.read().map_err(|_| poisoned())?;
            let row = orders
                .get(&id)
                .ok_or_else(|| StorageError::Backend(format!("order {id} vanished")))?;
            (row.order.clone(), row.lines.clone())
        };

        self.guards.push(guard);
        self.staged.insert(
            id,
            StagedOrder {
                order: order.clone(),
                lines,
                is_new: false,
            },
        );
        Ok(Some(order))
    }

    async fn read_order(
        &mut self,
        id: OrderId,
    ) -> Result<Option<(Order, Vec<LineItem>)>, StorageError> {
        // Header and lines under one guard: commits swap both under the write lock.
        let found = match self.staged.get(&id) {
            Some(staged) => Some((staged.order.clone(), staged.lines.clone())),
            None => {
                let orders = self.tables.orders.read().map_err(|_| poisoned())?;
                orders.get(&id).map(|row| (row.order.clone(), row.lines.clone()))
            }
        };
        Ok(found.map(|(order, mut lines)| {
            lines.sort_by_key(|l| l.line_no);
            (order, lines)
        }))
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StorageError> {
        self.fail_if_injected(FaultPoint::UpdateOrder)?;
        let staged = self.staged_mut(order.id_typed())?;
        staged.order = order.clone();
        Ok(())
    }

    async fn insert_line_item(&mut self, line: &LineItem) -> Result<(), StorageError> {
        self.fail_if_injected(FaultPoint::InsertLineItem)?;
        let staged = self.staged_mut(line.order_id)?;
        if staged.lines.iter().any(|l| l.line_no == line.line_no) {
            return Err(StorageError::Constraint(format!(
                "duplicate line {} on order {}",
                line.line_no, line.order_id
            )));
        }
        staged.lines.push(line.clone());
        Ok(())
    }

    async fn line_items(&mut self, order_id: OrderId) -> Result<Vec<LineItem>, StorageError> {
        let mut lines = match self.staged.get(&order_id) {
            Some(staged) => staged.lines.clone(),
            None => {
                let orders = self.tables.orders.read().map_err(|_| poisoned())?;
                orders
                    .get(&order_id)
                    .map(|row| row.lines.clone())
                    .unwrap_or_default()
            }
        };
        lines.sort_by_key(|l| l.line_no);
        Ok(lines)
    }

    async fn list_orders(
        &mut self,
        customer_id: Option<CustomerId>,
    ) -> Result<Vec<Order>, StorageError> {
        let mut out: Vec<Order> = {
            let orders = self.tables.orders.read().map_err(|_| poisoned())?;
            orders
                .values()
                .map(|row| match self.staged.get(&row.order.id_typed()) {
                    Some(staged) => staged.order.clone(),
                    None => row.order.clone(),
                })
                .collect()
        };
        out.extend(
            self.staged
                .values()
                .filter(|s| s.is_new)
                .map(|s| s.order.clone()),
        );
        if let Some(customer_id) = customer_id {
            out.retain(|o| o.customer_id() == customer_id);
        }
        out.sort_by_key(|o| (o.opened_at(), o.id_typed()));
        Ok(out)
    }

    async fn commit(mut self) -> Result<(), StorageError> {
        self.fail_if_injected(FaultPoint::Commit)?;

        let delay = self.tables.commit_delay.lock().ok().and_then(|slot| *slot);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            // Every lock is taken before anything is written, so a failure
            // below leaves the whole transaction unapplied.
            let mut orders = self.tables.orders.write().map_err(|_| poisoned())?;

            let mut releases: BTreeMap<ProductId, i64> = BTreeMap::new();
            for (id, quantity) in &self.pending_releases {
                let units = releases.entry(*id).or_default();
                *units = units
                    .checked_add(quantity.get())
                    .ok_or_else(|| StorageError::Constraint(format!("release overflow for product {id}")))?;
            }

            let mut rows = Vec::with_capacity(releases.len());
            for (id, units) in releases {
                let row = self
                    .tables
                    .product_row(id)?
                    .ok_or_else(|| StorageError::Backend(format!("product {id} vanished")))?;
                let quantity = Quantity::new(units).map_err(|e| StorageError::Constraint(e.to_string()))?;
                rows.push((row, quantity));
            }

            // Rows are locked in product id order.
            let mut locked = Vec::with_capacity(rows.len());
            for (row, quantity) in &rows {
                let product = row.lock().map_err(|_| poisoned())?;
                let level = apply_movement(&product, StockMovement::Release(*quantity))
                    .map_err(|e| StorageError::Constraint(e.to_string()))?;
                locked.push((product, level));
            }

            for (product, level) in &mut locked {
                product.set_available(*level);
            }
            drop(locked);
            self.pending_releases.clear();

            for (id, staged) in self.staged.drain() {
                if staged.is_new {
                    orders.insert(
                        id,
                        OrderRow {
                            lock: Arc::new(tokio::sync::Mutex::new(())),
                            order: staged.order,
                            lines: staged.lines,
                        },
                    );
                } else if let Some(row) = orders.get_mut(&id) {
                    row.order = staged.order;
                    row.lines = staged.lines;
                }
            }
        }

        self.reserved.clear();
        self.guards.clear();
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StorageError> {
        self.undo();
        Ok(())
    }
}
