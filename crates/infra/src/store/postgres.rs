//! Postgres-backed product/order store.
//!
//! Every transaction sets a local `lock_timeout`, so waiting on a contended
//! product or order row is bounded. Row locks are taken with
//! `SELECT ... FOR UPDATE` and held until commit or rollback.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |----------------------|------------|----------|
//! | `55P03` | `Contention` | `lock_timeout` expired waiting for a row lock |
//! | `40P01` | `Contention` | Chosen as deadlock victim |
//! | `40001` | `Contention` | Serialization failure |
//! | (pool timeout) | `Contention` | No connection became free in time |
//! | Any other | `Backend` | Constraint violations, connection failures, etc. |

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use orderflow_core::{OrderId, OrderItemId, ProductId, UserId};
use orderflow_inventory::{InventoryLedger, LedgerError, Product, StockDecrement, apply_decrement};
use orderflow_orders::{Order, OrderItem, OrderStatus};

use super::{OrderStore, OrderTransaction, StoreError};

/// Idempotent schema, applied in order by [`PostgresOrderStore::ensure_schema`].
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        price       NUMERIC(10, 2) NOT NULL CHECK (price >= 0),
        stock       BIGINT NOT NULL CHECK (stock >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id          UUID PRIMARY KEY,
        owner_id    UUID NOT NULL,
        status      TEXT NOT NULL CHECK (status IN ('pending', 'shipped', 'delivered')),
        total_price NUMERIC(12, 2) NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS orders_owner_idx ON orders (owner_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        id                UUID PRIMARY KEY,
        order_id          UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        product_id        UUID NOT NULL REFERENCES products (id) ON DELETE RESTRICT,
        position          INTEGER NOT NULL,
        quantity          BIGINT NOT NULL CHECK (quantity > 0),
        price_at_purchase NUMERIC(12, 2) NOT NULL,
        UNIQUE (order_id, position)
    )
    "#,
];

const ORDER_COLUMNS: &str = "id, owner_id, status, total_price, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, price_at_purchase";

#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub async fn connect(database_url: &str, lock_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // SET does not accept bind parameters.
        let set_timeout = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        Ok(Box::new(PostgresTransaction { tx }))
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        fetch_order(&mut conn, id, false).await
    }

    #[instrument(skip(self), err)]
    async fn list_orders(&self, owner: Option<UserId>) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE ($1::uuid IS NULL OR owner_id = $1) ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(owner.map(Uuid::from))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_orders", e))?;

        let item_sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position"
        );
        let item_rows = sqlx::query(&item_sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let item = item_from_row(row)?;
            items.entry(item.order_id()).or_default().push(item);
        }

        rows.iter()
            .map(|row| {
                let id = OrderId::from_uuid(try_get(row, "id")?);
                order_from_row(row, items.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, name, price, stock FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn put_product(&self, product: Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price, stock)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
                SET name = EXCLUDED.name, price = EXCLUDED.price, stock = EXCLUDED.stock
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("put_product", e))?;
        Ok(())
    }
}

/// An open Postgres transaction. Dropping it rolls back.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InventoryLedger for PostgresTransaction {
    async fn decrement(&mut self, product_id: ProductId, quantity: u32) -> Result<StockDecrement, LedgerError> {
        let row = sqlx::query("SELECT id, name, price, stock FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("decrement", e))?
            .ok_or(LedgerError::NotFound(product_id))?;

        let mut product = product_from_row(&row)?;
        let granted = apply_decrement(&mut product, quantity)?;

        sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
            .bind(product_id.as_uuid())
            .bind(granted.remaining)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("decrement", e))?;

        Ok(granted)
    }
}

#[async_trait]
impl OrderTransaction for PostgresTransaction {
    #[instrument(skip(self, order), fields(order_id = %order.id_typed()), err)]
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, owner_id, status, total_price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.owner().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total_price())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for (position, item) in order.items().iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoreError::Backend("too many order items".to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, position, quantity, price_at_purchase)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id().as_uuid())
            .bind(item.order_id().as_uuid())
            .bind(item.product_id().as_uuid())
            .bind(position)
            .bind(i64::from(item.quantity()))
            .bind(item.price_at_purchase())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;
        }

        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        fetch_order(&mut self.tx, id, true).await
    }

    async fn update_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_status", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!("order {id} disappeared during update")));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }
}

async fn fetch_order(conn: &mut PgConnection, id: OrderId, for_update: bool) -> Result<Option<Order>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{lock}");

    let Some(row) = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_order", e))?
    else {
        return Ok(None);
    };

    let item_sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY position");
    let item_rows = sqlx::query(&item_sql)
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_order", e))?;

    let items = item_rows.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()?;
    order_from_row(&row, items).map(Some)
}

fn try_get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {column}: {e}")))
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: ProductId::from_uuid(try_get(row, "id")?),
        name: try_get(row, "name")?,
        price: try_get(row, "price")?,
        stock: try_get(row, "stock")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    let quantity: i64 = try_get(row, "quantity")?;
    let quantity = u32::try_from(quantity)
        .map_err(|_| StoreError::Backend(format!("order item quantity out of range: {quantity}")))?;

    Ok(OrderItem::restore(
        OrderItemId::from_uuid(try_get(row, "id")?),
        OrderId::from_uuid(try_get(row, "order_id")?),
        ProductId::from_uuid(try_get(row, "product_id")?),
        quantity,
        try_get(row, "price_at_purchase")?,
    ))
}

fn order_from_row(row: &PgRow, items: Vec<OrderItem>) -> Result<Order, StoreError> {
    let status: String = try_get(row, "status")?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Order::restore(
        OrderId::from_uuid(try_get(row, "id")?),
        UserId::from_uuid(try_get(row, "owner_id")?),
        status,
        try_get(row, "total_price")?,
        try_get(row, "created_at")?,
        try_get(row, "updated_at")?,
        items,
    )
    .map_err(|e| StoreError::Backend(e.to_string()))
}

/// Map SQLx errors to store errors, classifying transient lock conflicts.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("40P01") | Some("40001") => StoreError::Contention(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Contention(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_enforces_stock_and_status_constraints() {
        let ddl = SCHEMA.join("\n");
        assert!(ddl.contains("CHECK (stock >= 0)"));
        assert!(ddl.contains("CHECK (status IN ('pending', 'shipped', 'delivered'))"));
        assert!(ddl.contains("ON DELETE CASCADE"));
        assert!(ddl.contains("ON DELETE RESTRICT"));
    }

    #[test]
    fn non_database_errors_map_to_backend() {
        assert!(matches!(
            map_sqlx_error("begin", sqlx::Error::PoolClosed),
            StoreError::Backend(_)
        ));
        assert!(matches!(
            map_sqlx_error("begin", sqlx::Error::PoolTimedOut),
            StoreError::Contention(_)
        ));
    }
}
