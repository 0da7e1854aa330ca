use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderflow_core::{OrderId, OrderItemId, ProductId, UserId};
use orderflow_orders::{Order, OrderItem, OrderLine, OrderStatus};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    #[serde(alias = "productId")]
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PutProductRequest {
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
}

impl PlaceOrderRequest {
    pub fn into_lines(self) -> Result<Vec<OrderLine>, Response> {
        self.items
            .into_iter()
            .map(|item| {
                Ok(OrderLine {
                    product_id: parse_id(&item.product_id, "product")?,
                    quantity: item.quantity,
                })
            })
            .collect()
    }
}

impl UpdateStatusRequest {
    pub fn status(&self) -> Result<OrderStatus, Response> {
        self.status
            .parse()
            .map_err(|e: orderflow_core::DomainError| {
                errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
            })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_at_purchase: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user: UserId,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id(),
            product_id: item.product_id(),
            quantity: item.quantity(),
            price_at_purchase: item.price_at_purchase(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id_typed(),
            user: order.owner(),
            status: order.status(),
            total_price: order.total_price(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
            items: order.items().iter().map(OrderItemResponse::from).collect(),
        }
    }
}

// -------------------------
// Helpers
// -------------------------

pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, Response>
where
    T: core::str::FromStr,
{
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

/// Unwrap a JSON body, reporting malformed input as a validation error.
pub fn json_body<T>(body: Result<axum::Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|axum::Json(value)| value)
        .map_err(|rejection| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_lines_accept_either_product_id_spelling() {
        let id = ProductId::new();
        let req: PlaceOrderRequest = serde_json::from_value(json!({
            "items": [
                {"product_id": id.to_string(), "quantity": 2},
                {"productId": id.to_string(), "quantity": 1},
            ]
        }))
        .unwrap();

        let lines = req.into_lines().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.product_id == id));
    }

    #[test]
    fn malformed_product_id_is_a_bad_request() {
        let req = PlaceOrderRequest {
            items: vec![OrderLineRequest {
                product_id: "nope".into(),
                quantity: 1,
            }],
        };
        let response = req.into_lines().unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unknown_status_is_a_bad_request() {
        let req = UpdateStatusRequest {
            status: "cancelled".into(),
        };
        assert_eq!(req.status().unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
