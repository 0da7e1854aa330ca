use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use orderflow_core::{OrderId, ProductId, UserId};
use orderflow_inventory::{InventoryLedger, LedgerError, Product, StockDecrement, apply_decrement};
use orderflow_orders::{Order, OrderStatus};

use super::{OrderStore, OrderTransaction, StoreError};

/// Row lock wait used when none is configured.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

type Row<T> = Arc<Mutex<T>>;

#[derive(Debug, Default)]
struct Tables {
    products: RwLock<HashMap<ProductId, Row<Product>>>,
    orders: RwLock<HashMap<OrderId, Row<Order>>>,
}

impl Tables {
    fn product_row(&self, id: ProductId) -> Result<Option<Row<Product>>, StoreError> {
        let products = self.products.read().map_err(|_| poisoned())?;
        Ok(products.get(&id).cloned())
    }

    fn order_row(&self, id: OrderId) -> Result<Option<Row<Order>>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        Ok(orders.get(&id).cloned())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

async fn lock_row<T>(row: Row<T>, timeout: Duration, what: &str) -> Result<OwnedMutexGuard<T>, StoreError> {
    tokio::time::timeout(timeout, row.lock_owned())
        .await
        .map_err(|_| StoreError::Contention(format!("timed out waiting for {what} row lock")))
}

/// In-memory product/order store with per-row locks.
///
/// Each product and order row sits behind its own async mutex, so transactions
/// touching disjoint rows never wait on each other. Lock waits are bounded by
/// `lock_timeout` and surface as [`StoreError::Contention`]. Intended for tests
/// and local runs.
#[derive(Debug, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<Tables>,
    lock_timeout: Duration,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl InMemoryOrderStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Tables::default()),
            lock_timeout,
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            tables: self.tables.clone(),
            lock_timeout: self.lock_timeout,
            products: HashMap::new(),
            orders: HashMap::new(),
            inserted: Vec::new(),
        }))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let Some(row) = self.tables.order_row(id)? else {
            return Ok(None);
        };
        let guard = lock_row(row, self.lock_timeout, "order").await?;
        Ok(Some(guard.clone()))
    }

    async fn list_orders(&self, owner: Option<UserId>) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<Row<Order>> = {
            let orders = self.tables.orders.read().map_err(|_| poisoned())?;
            orders.values().cloned().collect()
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let order = lock_row(row, self.lock_timeout, "order").await?.clone();
            if owner.is_none_or(|o| o == order.owner()) {
                out.push(order);
            }
        }
        out.sort_by_key(|o| (o.created_at(), o.id_typed()));
        Ok(out)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let Some(row) = self.tables.product_row(id)? else {
            return Ok(None);
        };
        let guard = lock_row(row, self.lock_timeout, "product").await?;
        Ok(Some(guard.clone()))
    }

    async fn put_product(&self, product: Product) -> Result<(), StoreError> {
        let existing = {
            let mut products = self.tables.products.write().map_err(|_| poisoned())?;
            match products.get(&product.id) {
                Some(row) => Some(row.clone()),
                None => {
                    products.insert(product.id, Arc::new(Mutex::new(product.clone())));
                    None
                }
            }
        };

        // Replacing an existing row waits for in-flight transactions holding it.
        if let Some(row) = existing {
            *lock_row(row, self.lock_timeout, "product").await? = product;
        }
        Ok(())
    }
}

/// A row held for the rest of the transaction plus its uncommitted value.
struct LockedRow<T> {
    guard: OwnedMutexGuard<T>,
    pending: T,
}

impl<T: Clone> LockedRow<T> {
    fn new(guard: OwnedMutexGuard<T>) -> Self {
        let pending = guard.clone();
        Self { guard, pending }
    }

    fn write_back(mut self) {
        *self.guard = self.pending;
    }
}

struct InMemoryTransaction {
    tables: Arc<Tables>,
    lock_timeout: Duration,
    products: HashMap<ProductId, LockedRow<Product>>,
    orders: HashMap<OrderId, LockedRow<Order>>,
    inserted: Vec<Order>,
}

#[async_trait]
impl InventoryLedger for InMemoryTransaction {
    async fn decrement(&mut self, product_id: ProductId, quantity: u32) -> Result<StockDecrement, LedgerError> {
        if !self.products.contains_key(&product_id) {
            let row = self
                .tables
                .product_row(product_id)?
                .ok_or(LedgerError::NotFound(product_id))?;
            let guard = lock_row(row, self.lock_timeout, "product").await?;
            self.products.insert(product_id, LockedRow::new(guard));
        }

        let locked = self
            .products
            .get_mut(&product_id)
            .ok_or(LedgerError::NotFound(product_id))?;
        apply_decrement(&mut locked.pending, quantity)
    }
}

#[async_trait]
impl OrderTransaction for InMemoryTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.tables.order_row(order.id_typed())?.is_some()
            || self.inserted.iter().any(|o| o.id_typed() == order.id_typed())
        {
            return Err(StoreError::Backend(format!("order {} already exists", order.id_typed())));
        }
        self.inserted.push(order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        if let Some(locked) = self.orders.get(&id) {
            return Ok(Some(locked.pending.clone()));
        }

        let Some(row) = self.tables.order_row(id)? else {
            return Ok(None);
        };
        let locked = LockedRow::new(lock_row(row, self.lock_timeout, "order").await?);
        let order = locked.pending.clone();
        self.orders.insert(id, locked);
        Ok(Some(order))
    }

    async fn update_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let locked = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("order {id} is not locked by this transaction")))?;

        let current = &locked.pending;
        locked.pending = Order::restore(
            current.id_typed(),
            current.owner(),
            status,
            current.total_price(),
            current.created_at(),
            updated_at,
            current.items().to_vec(),
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;

        if !this.inserted.is_empty() {
            let mut orders = this.tables.orders.write().map_err(|_| poisoned())?;
            for order in this.inserted {
                orders.insert(order.id_typed(), Arc::new(Mutex::new(order)));
            }
        }

        for (_, locked) in this.orders {
            locked.write_back();
        }
        for (_, locked) in this.products {
            locked.write_back();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_orders::OrderItem;
    use rust_decimal::Decimal;

    async fn seeded(stock: i64) -> (InMemoryOrderStore, ProductId) {
        let store = InMemoryOrderStore::new(Duration::from_millis(200));
        let id = ProductId::new();
        store
            .put_product(Product::new(id, "Widget", Decimal::new(1000, 2), stock).unwrap())
            .await
            .unwrap();
        (store, id)
    }

    fn order_for(owner: UserId, product: ProductId, quantity: u32) -> Order {
        let id = OrderId::new();
        let item = OrderItem::new(id, product, quantity, Decimal::new(1000, 2));
        Order::place(id, owner, vec![item], Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back_decrements() {
        let (store, id) = seeded(5).await;

        let mut tx = store.begin().await.unwrap();
        tx.decrement(id, 3).await.unwrap();
        drop(tx);

        assert_eq!(store.get_product(id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn repeated_product_in_one_transaction_sees_earlier_decrement() {
        let (store, id) = seeded(5).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.decrement(id, 3).await.unwrap().remaining, 2);
        let err = tx.decrement(id, 3).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { available: 2, .. }));
        tx.commit().await.unwrap();

        assert_eq!(store.get_product(id).await.unwrap().unwrap().stock, 2);
    }

    #[tokio::test]
    async fn missing_product_is_not_found() {
        let store = InMemoryOrderStore::default();
        let mut tx = store.begin().await.unwrap();
        let missing = ProductId::new();
        assert_eq!(tx.decrement(missing, 1).await.unwrap_err(), LedgerError::NotFound(missing));
    }

    #[tokio::test]
    async fn held_row_lock_times_out_as_contention() {
        let (store, id) = seeded(5).await;

        let mut first = store.begin().await.unwrap();
        first.decrement(id, 1).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = second.decrement(id, 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::Contention(_)));

        first.commit().await.unwrap();
        assert_eq!(store.get_product(id).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn orders_become_visible_only_on_commit() {
        let (store, product) = seeded(5).await;
        let owner = UserId::new();
        let order = order_for(owner, product, 1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        assert!(store.get_order(order.id_typed()).await.unwrap().is_none());
        tx.commit().await.unwrap();

        assert_eq!(store.get_order(order.id_typed()).await.unwrap(), Some(order.clone()));
        assert_eq!(store.list_orders(Some(owner)).await.unwrap(), vec![order]);
        assert!(store.list_orders(Some(UserId::new())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_update_applies_on_commit() {
        let (store, product) = seeded(5).await;
        let order = order_for(UserId::new(), product, 1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let locked = tx.lock_order(order.id_typed()).await.unwrap().unwrap();
        assert_eq!(locked.status(), OrderStatus::Pending);
        tx.update_status(order.id_typed(), OrderStatus::Shipped, Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let reloaded = store.get_order(order.id_typed()).await.unwrap().unwrap();
        assert_eq!(reloaded.status(), OrderStatus::Shipped);
        assert_eq!(reloaded.total_price(), order.total_price());
    }
}
