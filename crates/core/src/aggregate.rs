//! Aggregate root trait for domain models that own a consistency boundary.

/// Aggregate root marker + minimal interface.
///
/// An aggregate root is the only entry point for mutating the objects it owns
/// (an order and its line items, for instance). Persistence adapters load and
/// store whole aggregates; they never patch owned children individually.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;
}
