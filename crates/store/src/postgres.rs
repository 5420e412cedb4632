//! PostgreSQL-backed repositories.

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, Money, OrderId, PaymentId, StoreId};
use domain::{CartItem, Fulfillment, Order, OrderLine, OrderNumber, OrderRecord, OrderStatus};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{CartRepository, OrderRepository, Result, SoftDelete, StoreError};

const ORDER_COLUMNS: &str = "id, order_number, customer_id, store_id, status, fulfillment, lines, \
     total_price, use_points, points_to_use, final_payment_amount, payment_id, created_at, \
     updated_at, deleted_at";

/// Runs the database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed order repository.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status_code: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_code)
            .ok_or_else(|| StoreError::CorruptRecord(format!("unknown status {status_code}")))?;
        let fulfillment: Fulfillment = serde_json::from_value(row.try_get("fulfillment")?)?;
        let lines: Vec<OrderLine> = serde_json::from_value(row.try_get("lines")?)?;

        Ok(Order::from_record(OrderRecord {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: OrderNumber::new(row.try_get::<String, _>("order_number")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
            status,
            fulfillment,
            lines,
            total_price: Money::new(row.try_get("total_price")?),
            use_points: row.try_get("use_points")?,
            points_to_use: Money::new(row.try_get("points_to_use")?),
            final_payment_amount: Money::new(row.try_get("final_payment_amount")?),
            payment_id: row
                .try_get::<Option<Uuid>, _>("payment_id")?
                .map(PaymentId::from_uuid),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        }))
    }

    async fn list_by(&self, column: &str, id: Uuid) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE {column} = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql).bind(id).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn set_deleted_at(&self, id: OrderId, deleted: bool) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET deleted_at = CASE WHEN $2 THEN $3 ELSE NULL END, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(deleted)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id(), order_number = %order.order_number()))]
    async fn insert(&self, order: &Order) -> Result<()> {
        let record = order.to_record();
        let fulfillment = serde_json::to_value(&record.fulfillment)?;
        let lines = serde_json::to_value(&record.lines)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, customer_id, store_id, status, order_type,
                                fulfillment, lines, total_price, use_points, points_to_use,
                                final_payment_amount, payment_id, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.order_number.as_str())
        .bind(record.customer_id.as_uuid())
        .bind(record.store_id.as_uuid())
        .bind(record.status.as_str())
        .bind(record.fulfillment.order_type().as_str())
        .bind(fulfillment)
        .bind(lines)
        .bind(record.total_price.amount())
        .bind(record.use_points)
        .bind(record.points_to_use.amount())
        .bind(record.final_payment_amount.amount())
        .bind(record.payment_id.map(|id| id.as_uuid()))
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("unique_order_number") => {
                        metrics::counter!("order_number_collisions_total").increment(1);
                        return StoreError::DuplicateOrderNumber(record.order_number.to_string());
                    }
                    Some("orders_pkey") => return StoreError::DuplicateOrderId(record.id),
                    _ => {}
                }
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1");
        let row = sqlx::query(&sql)
            .bind(number.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        self.list_by("customer_id", customer_id.as_uuid()).await
    }

    async fn find_by_store(&self, store_id: StoreId) -> Result<Vec<Order>> {
        self.list_by("store_id", store_id.as_uuid()).await
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id(), status = %order.status()))]
    async fn update_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_id = $3, updated_at = $4
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_id().map(|id| id.as_uuid()))
        .bind(order.updated_at())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Distinguish a lost race from a missing row
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
            .bind(order.id().as_uuid())
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::OrderNotFound(order.id()))
        }
    }
}

#[async_trait]
impl SoftDelete for PostgresOrderRepository {
    type Id = OrderId;
    type Entity = Order;

    async fn find_active(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn soft_delete(&self, id: OrderId) -> Result<bool> {
        self.set_deleted_at(id, true).await
    }

    async fn restore(&self, id: OrderId) -> Result<bool> {
        self.set_deleted_at(id, false).await
    }
}

/// PostgreSQL-backed cart repository. Each cart is one JSONB row.
#[derive(Clone)]
pub struct PostgresCartRepository {
    pool: PgPool,
}

impl PostgresCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartRepository for PostgresCartRepository {
    async fn find(&self, customer_id: CustomerId) -> Result<Option<Vec<CartItem>>> {
        let items: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT items FROM carts WHERE customer_id = $1")
                .bind(customer_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match items {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, items), fields(customer_id = %customer_id, lines = items.len()))]
    async fn save(&self, customer_id: CustomerId, items: &[CartItem]) -> Result<()> {
        if items.is_empty() {
            return self.delete(customer_id).await;
        }

        let value = serde_json::to_value(items)?;
        sqlx::query(
            r#"
            INSERT INTO carts (customer_id, items, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (customer_id) DO UPDATE SET items = EXCLUDED.items, updated_at = NOW()
            "#,
        )
        .bind(customer_id.as_uuid())
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, customer_id: CustomerId) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE customer_id = $1")
            .bind(customer_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
