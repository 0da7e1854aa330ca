//! Inventory Ledger: per-product stock counters and their atomic decrement.
//!
//! This crate holds the product model, the ledger contract that storage
//! backends implement inside their transactions, and the pure decrement rule
//! every backend applies under its row lock.

pub mod ledger;
pub mod product;

pub use ledger::{InventoryLedger, LedgerError, StockDecrement, apply_decrement};
pub use product::Product;
