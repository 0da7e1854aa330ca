use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderflow_core::{AggregateRoot, DomainError, DomainResult, OrderId, OrderItemId, ProductId, UserId};

/// Order status lifecycle: `pending → shipped → delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Shipped,
    Delivered,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [OrderStatus::Pending, OrderStatus::Shipped, OrderStatus::Delivered];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// Allowed edges: `pending→shipped`, `shipped→delivered`. Nothing else,
    /// including staying in place.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Shipped) | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            other => Err(DomainError::validation(format!(
                "unknown status '{other}' (expected pending, shipped or delivered)"
            ))),
        }
    }
}

/// A requested order line as supplied by the caller (not yet validated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// An order line that passed validation: positive, bounded quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Validate requested lines before any transaction is opened.
///
/// Order of lines is preserved; the same product may appear more than once.
pub fn validate_lines(lines: &[OrderLine]) -> DomainResult<Vec<ValidatedLine>> {
    if lines.is_empty() {
        return Err(DomainError::validation("order must contain at least one item"));
    }

    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity must be positive (item {})",
                    idx + 1
                )));
            }
            let quantity = u32::try_from(line.quantity).map_err(|_| {
                DomainError::validation(format!("quantity too large (item {})", idx + 1))
            })?;
            Ok(ValidatedLine {
                product_id: line.product_id,
                quantity,
            })
        })
        .collect()
}

/// Order line item. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    quantity: u32,
    /// Unit price snapshot taken when the order was placed.
    price_at_purchase: Decimal,
}

impl OrderItem {
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: u32, price_at_purchase: Decimal) -> Self {
        Self::restore(OrderItemId::new(), order_id, product_id, quantity, price_at_purchase)
    }

    /// Rebuild an item from persisted state.
    pub fn restore(
        id: OrderItemId,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        price_at_purchase: Decimal,
    ) -> Self {
        Self {
            id,
            order_id,
            product_id,
            quantity,
            price_at_purchase,
        }
    }

    pub fn id(&self) -> OrderItemId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn price_at_purchase(&self) -> Decimal {
        self.price_at_purchase
    }

    /// `None` when the line overflows the decimal range.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price_at_purchase.checked_mul(Decimal::from(self.quantity))
    }
}

/// Σ(quantity × price_at_purchase).
pub fn compute_total(items: &[OrderItem]) -> DomainResult<Decimal> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| {
            item.line_total().and_then(|line| acc.checked_add(line))
        })
        .ok_or_else(|| DomainError::validation("order total out of range"))
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    owner: UserId,
    status: OrderStatus,
    total_price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    items: Vec<OrderItem>,
}

impl Order {
    /// Build a freshly placed order in `pending` with its total computed from
    /// the item snapshots.
    pub fn place(id: OrderId, owner: UserId, items: Vec<OrderItem>, now: DateTime<Utc>) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        Self::ensure_items_belong(id, &items)?;
        let total_price = compute_total(&items)?;

        Ok(Self {
            id,
            owner,
            status: OrderStatus::Pending,
            total_price,
            created_at: now,
            updated_at: now,
            items,
        })
    }

    /// Rebuild an order from persisted state, re-checking the total invariant.
    pub fn restore(
        id: OrderId,
        owner: UserId,
        status: OrderStatus,
        total_price: Decimal,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        items: Vec<OrderItem>,
    ) -> DomainResult<Self> {
        Self::ensure_items_belong(id, &items)?;
        let expected = compute_total(&items)?;
        if expected != total_price {
            return Err(DomainError::invariant(format!(
                "order {id} total {total_price} does not match items ({expected})"
            )));
        }

        Ok(Self {
            id,
            owner,
            status,
            total_price,
            created_at,
            updated_at,
            items,
        })
    }

    fn ensure_items_belong(id: OrderId, items: &[OrderItem]) -> DomainResult<()> {
        if items.iter().any(|item| item.order_id != id) {
            return Err(DomainError::invariant("order item belongs to another order"));
        }
        Ok(())
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_price(&self) -> Decimal {
        self.total_price
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Gate for status change requests.
    ///
    /// Privileged actors pass. The owner passes only when re-requesting the
    /// current status (which the transition check then rejects). Everyone
    /// else is forbidden.
    pub fn authorize_status_change(
        &self,
        actor: UserId,
        privileged: bool,
        requested: OrderStatus,
    ) -> DomainResult<()> {
        if privileged || (actor == self.owner && requested == self.status) {
            Ok(())
        } else {
            Err(DomainError::Forbidden)
        }
    }

    /// Move to `next` if the edge is allowed; otherwise leave the order untouched.
    pub fn transition_to(&mut self, next: OrderStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::invalid_transition(self.status.as_str(), next.as_str()));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
