//! Live notification fan-out.
//!
//! - `event`: the contract a published notification satisfies (recipient + type)
//! - `hub`: the per-identity connection registry and best-effort broadcast

pub mod event;
pub mod hub;

pub use event::Event;
pub use hub::{Connection, ConnectionId, Delivery, HubError, NotificationHub, DEFAULT_CONNECTION_BUFFER};
