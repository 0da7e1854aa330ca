use chrono::{DateTime, Utc};

use orderflow_core::UserId;

/// A notification published after a committed state change.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **addressed** to exactly one identity; every live connection of that
///   identity receives a copy
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "order_created").
    fn event_type(&self) -> &'static str;

    /// Identity whose live connections receive this event.
    fn recipient(&self) -> UserId;

    /// When the underlying change was committed (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
