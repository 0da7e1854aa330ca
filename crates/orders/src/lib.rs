//! Order Aggregate (order + immutable line items) and its notifications.
//!
//! This crate contains business rules for orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod notification;
pub mod order;

pub use notification::{OrderEvent, OrderEventKind, OrderUpdateFrame};
pub use order::{Order, OrderItem, OrderLine, OrderStatus, ValidatedLine, validate_lines};
