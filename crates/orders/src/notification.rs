//! Order status notifications pushed to the owner's live connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderflow_core::{OrderId, UserId};
use orderflow_events::Event;

use crate::order::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    OrderCreated,
    StatusChanged,
}

/// Published after a committed order mutation, addressed to the order owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub kind: OrderEventKind,
    pub order_id: OrderId,
    pub recipient: UserId,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn created(order: &Order) -> Self {
        Self::from_order(OrderEventKind::OrderCreated, order)
    }

    pub fn status_changed(order: &Order) -> Self {
        Self::from_order(OrderEventKind::StatusChanged, order)
    }

    fn from_order(kind: OrderEventKind, order: &Order) -> Self {
        Self {
            kind,
            order_id: order.id_typed(),
            recipient: order.owner(),
            status: order.status(),
            occurred_at: order.updated_at(),
        }
    }

    /// Wire frame pushed over the streaming channel.
    pub fn frame(&self) -> OrderUpdateFrame {
        OrderUpdateFrame::new(self.order_id, self.status)
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self.kind {
            OrderEventKind::OrderCreated => "order_created",
            OrderEventKind::StatusChanged => "status_changed",
        }
    }

    fn recipient(&self) -> UserId {
        self.recipient
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// `{"type": "order_update", "order_id": ..., "status": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdateFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub order_id: OrderId,
    pub status: OrderStatus,
}

impl OrderUpdateFrame {
    pub const TYPE: &'static str = "order_update";

    pub fn new(order_id: OrderId, status: OrderStatus) -> Self {
        Self {
            frame_type: Self::TYPE.to_string(),
            order_id,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::ProductId;
    use rust_decimal::Decimal;

    use crate::order::OrderItem;

    #[test]
    fn events_are_addressed_to_the_owner() {
        let owner = UserId::new();
        let id = OrderId::new();
        let mut order = Order::place(
            id,
            owner,
            vec![OrderItem::new(id, ProductId::new(), 1, Decimal::new(500, 2))],
            Utc::now(),
        )
        .unwrap();

        let created = OrderEvent::created(&order);
        assert_eq!(created.event_type(), "order_created");
        assert_eq!(created.recipient(), owner);
        assert_eq!(created.status, OrderStatus::Pending);

        order.transition_to(OrderStatus::Shipped, Utc::now()).unwrap();
        let changed = OrderEvent::status_changed(&order);
        assert_eq!(changed.event_type(), "status_changed");
        assert_eq!(changed.status, OrderStatus::Shipped);
    }

    #[test]
    fn frame_matches_wire_shape() {
        let id = OrderId::new();
        let frame = OrderUpdateFrame::new(id, OrderStatus::Shipped);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "order_update",
                "order_id": id.to_string(),
                "status": "shipped",
            })
        );
    }
}
