//! Inventory Ledger contract.
//!
//! `decrement` runs inside the caller's enclosing transaction. Implementations
//! must hold an exclusive lock on the product row between the stock read and
//! the write, so concurrent decrements on one product are strictly serialized
//! while decrements on different products proceed in parallel.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use orderflow_core::ProductId;

use crate::Product;

/// Result of a granted decrement: the price in force at that instant and the
/// stock left on the row (as seen by the enclosing transaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDecrement {
    pub product_id: ProductId,
    pub unit_price: Decimal,
    pub remaining: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// Transient lock contention (timeout, deadlock victim). Retryable.
    #[error("contention on product row: {0}")]
    Contention(String),

    #[error("ledger backend failure: {0}")]
    Backend(String),
}

/// Transaction-scoped stock decrement.
///
/// `quantity` must be positive; callers validate that before opening a
/// transaction.
#[async_trait]
pub trait InventoryLedger: Send {
    async fn decrement(&mut self, product_id: ProductId, quantity: u32) -> Result<StockDecrement, LedgerError>;
}

/// The decrement rule, applied to a product row the caller has locked.
///
/// On `InsufficientStock` the product is left untouched.
pub fn apply_decrement(product: &mut Product, quantity: u32) -> Result<StockDecrement, LedgerError> {
    debug_assert!(quantity > 0, "decrement quantity must be positive");

    let requested = i64::from(quantity);
    if product.stock < requested {
        return Err(LedgerError::InsufficientStock {
            product_id: product.id,
            requested: quantity,
            available: product.stock,
        });
    }

    product.stock -= requested;
    Ok(StockDecrement {
        product_id: product.id,
        unit_price: product.price,
        remaining: product.stock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(stock: i64) -> Product {
        Product::new(ProductId::new(), "Widget", Decimal::new(1000, 2), stock).unwrap()
    }

    #[test]
    fn decrement_reduces_stock_and_reports_price() {
        let mut p = product(5);
        let d = apply_decrement(&mut p, 2).unwrap();
        assert_eq!(p.stock, 3);
        assert_eq!(d.remaining, 3);
        assert_eq!(d.unit_price, Decimal::new(1000, 2));
        assert_eq!(d.product_id, p.id);
    }

    #[test]
    fn decrement_to_exactly_zero_is_allowed() {
        let mut p = product(4);
        apply_decrement(&mut p, 4).unwrap();
        assert_eq!(p.stock, 0);
    }

    #[test]
    fn insufficient_stock_leaves_row_untouched() {
        let mut p = product(2);
        let before = p.clone();
        let err = apply_decrement(&mut p, 3).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                product_id: p.id,
                requested: 3,
                available: 2,
            }
        );
        assert_eq!(p, before);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any sequence of decrement attempts keeps stock non-negative,
        /// and the final stock equals the initial stock minus granted quantities.
        #[test]
        fn stock_never_goes_negative(
            initial in 0i64..500,
            requests in prop::collection::vec(1u32..50, 0..40)
        ) {
            let mut p = product(initial);
            let mut granted: i64 = 0;

            for q in requests {
                if apply_decrement(&mut p, q).is_ok() {
                    granted += i64::from(q);
                }
                prop_assert!(p.stock >= 0);
            }

            prop_assert_eq!(p.stock, initial - granted);
        }
    }
}
