//! Order Service: transactional orchestration of placement and status changes.
//!
//! ## Placement
//!
//! ```text
//! lines
//!   ↓
//! 1. Validate (no transaction opened on failure)
//!   ↓
//! 2. Begin transaction
//!   ↓
//! 3. Decrement each line's product, in the caller's order, capturing its price
//!   ↓
//! 4. Build the order aggregate and insert it
//!   ↓
//! 5. Commit
//!   ↓
//! 6. Invalidate cache, then publish `order_created`
//! ```
//!
//! Any failure in steps 2-5 drops the transaction, which rolls back every
//! decrement already made. Step 6 runs only after a successful commit and its
//! failures are logged, never returned.
//!
//! Transient contention (row lock timeout, deadlock, serialization failure)
//! retries the whole transaction a bounded number of times with jittered
//! backoff before surfacing as [`OrderServiceError::Contention`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use orderflow_auth::Actor;
use orderflow_core::{DomainError, OrderId, ProductId, UserId};
use orderflow_events::NotificationHub;
use orderflow_inventory::{InventoryLedger, LedgerError, Product};
use orderflow_orders::{Order, OrderEvent, OrderItem, OrderLine, OrderStatus, ValidatedLine, validate_lines};

use crate::cache::CacheInvalidator;
use crate::store::{OrderStore, OrderTransaction, StoreError};

/// Upper bound on one post-commit cache invalidation.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    #[error("forbidden")]
    Forbidden,

    #[error("invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    /// Retries exhausted on transient contention. The caller may try again.
    #[error("transient contention: {0}")]
    Contention(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<DomainError> for OrderServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Self::InsufficientStock {
                product_id,
                requested,
                available,
            },
            DomainError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            DomainError::Forbidden => Self::Forbidden,
            DomainError::InvariantViolation(msg) => Self::Store(msg),
        }
    }
}

impl From<LedgerError> for OrderServiceError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::NotFound(id) => Self::NotFound(format!("product {id} not found")),
            LedgerError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Self::InsufficientStock {
                product_id,
                requested,
                available,
            },
            LedgerError::Contention(msg) => Self::Contention(msg),
            LedgerError::Backend(msg) => Self::Store(msg),
        }
    }
}

impl From<StoreError> for OrderServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Contention(msg) => Self::Contention(msg),
            StoreError::Backend(msg) => Self::Store(msg),
        }
    }
}

/// Bounded retry of a transaction on transient contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with up to 50% random jitter.
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_backoff.saturating_mul(1 << attempt.saturating_sub(1).min(6));
        let jitter_ms = match u64::try_from(base.as_millis() / 2) {
            Ok(0) | Err(_) => 0,
            Ok(max) => rand::thread_rng().gen_range(0..=max),
        };
        base + Duration::from_millis(jitter_ms)
    }
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn CacheInvalidator>,
    hub: NotificationHub<OrderEvent>,
    retry: RetryPolicy,
    cache_timeout: Duration,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn CacheInvalidator>,
        hub: NotificationHub<OrderEvent>,
    ) -> Self {
        Self {
            store,
            cache,
            hub,
            retry: RetryPolicy::default(),
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    pub fn hub(&self) -> &NotificationHub<OrderEvent> {
        &self.hub
    }

    /// Place an order for `actor`, all-or-nothing.
    #[instrument(skip(self, lines), fields(user_id = %actor, lines = lines.len()))]
    pub async fn place_order(&self, actor: UserId, lines: &[OrderLine]) -> Result<Order, OrderServiceError> {
        let lines = validate_lines(lines)?;
        let lines = &lines;

        let order = self
            .retrying("place_order", move || self.try_place_order(actor, lines))
            .await?;

        info!(order_id = %order.id_typed(), total = %order.total_price(), "order placed");
        self.after_commit(OrderEvent::created(&order)).await;
        Ok(order)
    }

    async fn try_place_order(&self, actor: UserId, lines: &[ValidatedLine]) -> Result<Order, OrderServiceError> {
        let mut tx = self.store.begin().await?;
        let order_id = OrderId::new();

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let granted = tx.decrement(line.product_id, line.quantity).await?;
            debug!(product_id = %line.product_id, remaining = granted.remaining, "stock decremented");
            items.push(OrderItem::new(order_id, line.product_id, line.quantity, granted.unit_price));
        }

        let order = Order::place(order_id, actor, items, Utc::now())?;
        tx.insert_order(&order).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Move an order along its lifecycle on behalf of `actor`.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id, status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        actor: &Actor,
    ) -> Result<Order, OrderServiceError> {
        let actor = *actor;

        let (order, previous) = self
            .retrying("update_status", move || self.try_update_status(order_id, new_status, actor))
            .await?;

        info!(order_id = %order_id, from = %previous, to = %order.status(), "order status changed");
        if previous != order.status() {
            self.after_commit(OrderEvent::status_changed(&order)).await;
        }
        Ok(order)
    }

    async fn try_update_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        actor: Actor,
    ) -> Result<(Order, OrderStatus), OrderServiceError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| OrderServiceError::NotFound(format!("order {order_id} not found")))?;

        order.authorize_status_change(actor.user_id, actor.privileged, new_status)?;

        let previous = order.status();
        order.transition_to(new_status, Utc::now())?;
        tx.update_status(order_id, order.status(), order.updated_at()).await?;
        tx.commit().await?;
        Ok((order, previous))
    }

    /// An order visible to `actor`. Someone else's order reads as missing.
    pub async fn get_order(&self, order_id: OrderId, actor: &Actor) -> Result<Order, OrderServiceError> {
        match self.store.get_order(order_id).await? {
            Some(order) if actor.can_view(order.owner()) => Ok(order),
            _ => Err(OrderServiceError::NotFound(format!("order {order_id} not found"))),
        }
    }

    /// The actor's own orders, or every order for a privileged actor.
    pub async fn list_orders(&self, actor: &Actor) -> Result<Vec<Order>, OrderServiceError> {
        let owner = (!actor.privileged).then_some(actor.user_id);
        Ok(self.store.list_orders(owner).await?)
    }

    pub async fn get_product(&self, product_id: ProductId) -> Result<Product, OrderServiceError> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| OrderServiceError::NotFound(format!("product {product_id} not found")))
    }

    /// Create or replace a product (restock, repricing). Privileged actors only.
    ///
    /// Existing orders keep their price snapshots.
    #[instrument(skip(self, actor, product), fields(user_id = %actor.user_id, product_id = %product.id))]
    pub async fn put_product(&self, actor: &Actor, product: Product) -> Result<Product, OrderServiceError> {
        if !actor.privileged {
            return Err(OrderServiceError::Forbidden);
        }

        self.retrying("put_product", || self.store.put_product(product.clone()))
            .await?;
        info!(stock = product.stock, price = %product.price, "product saved");
        self.invalidate_cache().await;
        Ok(product)
    }

    async fn retrying<T, E, F, Fut>(&self, operation: &'static str, mut attempt_fn: F) -> Result<T, OrderServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OrderServiceError>,
    {
        let mut attempt = 0;
        loop {
            match attempt_fn().await.map_err(Into::into) {
                Err(OrderServiceError::Contention(reason)) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "transient contention; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Post-commit side effects. Failures here never reach the caller.
    async fn after_commit(&self, event: OrderEvent) {
        self.invalidate_cache().await;

        let event_type = orderflow_events::Event::event_type(&event);
        let order_id = event.order_id;
        let delivery = self.hub.publish(event);
        debug!(
            %order_id,
            event_type,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "notification published"
        );
    }

    async fn invalidate_cache(&self) {
        match tokio::time::timeout(self.cache_timeout, self.cache.invalidate()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "cache invalidation failed after commit"),
            Err(_) => warn!(
                timeout_ms = self.cache_timeout.as_millis() as u64,
                "cache invalidation timed out after commit"
            ),
        }
    }
}
