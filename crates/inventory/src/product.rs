use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderflow_core::{DomainError, DomainResult, ProductId};

/// Decimal places allowed in a price (matches the `NUMERIC(10,2)` column).
pub const PRICE_SCALE: u32 = 2;

/// Exclusive upper bound of a price: ten digits, two of them fractional.
const PRICE_CEILING: i64 = 100_000_000;

/// A catalog product together with its stock counter.
///
/// Stock is mutated only through [`crate::apply_decrement`] (order placement)
/// or by administrative replacement of the whole record (restock, repricing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Current unit price. Orders snapshot this at placement time.
    pub price: Decimal,
    /// Units on hand. Never negative.
    pub stock: i64,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, price: Decimal, stock: i64) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if price.is_sign_negative() {
            return Err(DomainError::validation("price cannot be negative"));
        }
        if price.normalize().scale() > PRICE_SCALE {
            return Err(DomainError::validation("price has more than two decimal places"));
        }
        if price >= Decimal::from(PRICE_CEILING) {
            return Err(DomainError::validation("price out of range"));
        }
        if stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }
        Ok(Self {
            id,
            name,
            price,
            stock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_stock_and_price() {
        let id = ProductId::new();
        assert!(Product::new(id, "Lamp", Decimal::new(1000, 2), -1).is_err());
        assert!(Product::new(id, "Lamp", Decimal::new(-1, 2), 1).is_err());
        assert!(Product::new(id, "  ", Decimal::new(100, 2), 1).is_err());
        assert!(Product::new(id, "Lamp", Decimal::ZERO, 0).is_ok());
    }

    #[test]
    fn price_must_fit_ten_digits_with_two_decimals() {
        let id = ProductId::new();
        assert!(Product::new(id, "Lamp", Decimal::new(9_999_999_999, 2), 1).is_ok());
        assert!(Product::new(id, "Lamp", Decimal::new(10_000_000_000, 2), 1).is_err());
        assert!(Product::new(id, "Lamp", Decimal::MAX, 1).is_err());
        assert!(Product::new(id, "Lamp", Decimal::new(1_005, 3), 1).is_err());
        // Trailing zeros do not count as extra precision.
        assert!(Product::new(id, "Lamp", Decimal::new(10_500, 3), 1).is_ok());
    }
}
