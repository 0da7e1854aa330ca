//! Transactional storage boundary for products and orders.
//!
//! A transaction is opened with [`OrderStore::begin`], used as the
//! [`InventoryLedger`] for stock decrements and for order writes, and either
//! committed explicitly or rolled back by being dropped.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use orderflow_core::{OrderId, ProductId, UserId};
use orderflow_inventory::{InventoryLedger, LedgerError, Product};
use orderflow_orders::{Order, OrderStatus};

pub use in_memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transient lock/serialization conflict. Safe to retry the whole transaction.
    #[error("contention: {0}")]
    Contention(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Contention(msg) => LedgerError::Contention(msg),
            StoreError::Backend(msg) => LedgerError::Backend(msg),
        }
    }
}

/// One open unit of work. Dropping it without [`commit`](Self::commit) discards
/// every write made through it and releases its row locks.
#[async_trait]
pub trait OrderTransaction: InventoryLedger {
    /// Persist a freshly placed order together with its items.
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Load an order and hold its row lock until the transaction ends.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn update_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Orders oldest first; restricted to `owner` when given.
    async fn list_orders(&self, owner: Option<UserId>) -> Result<Vec<Order>, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Create or replace a product record (restock, repricing).
    async fn put_product(&self, product: Product) -> Result<(), StoreError>;
}
