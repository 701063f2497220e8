use async_trait::async_trait;
use courier_domain::{
    DispatchError, DispatchOrder, DispatchResult, GeoPoint, OrderRepository, OrderStatus,
    PaymentStatus,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

pub struct SqliteOrderRepository {
    pool: SqlitePool,
}

impl SqliteOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> DispatchResult<DispatchOrder> {
        let id: String = row.try_get("id")?;
        let shipment_id: String = row.try_get("shipment_id")?;
        let customer_id: String = row.try_get("customer_id")?;
        let merchant_id: String = row.try_get("merchant_id")?;
        let assigned_courier: Option<String> = row.try_get("assigned_courier")?;

        Ok(DispatchOrder {
            id: parse_uuid(&id)?,
            shipment_id: parse_uuid(&shipment_id)?,
            customer_id: parse_uuid(&customer_id)?,
            merchant_id: parse_uuid(&merchant_id)?,
            status: row.try_get::<OrderStatus, _>("status")?,
            payment_status: row.try_get::<PaymentStatus, _>("payment_status")?,
            assigned_courier: assigned_courier.map(|s| parse_uuid(&s)).transpose()?,
            pickup_code: row.try_get("pickup_code")?,
            delivery_code: row.try_get("delivery_code")?,
            delivery_location: GeoPoint::new(
                row.try_get("delivery_latitude")?,
                row.try_get("delivery_longitude")?,
            ),
            delivery_address: row.try_get("delivery_address")?,
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn save(&self, order: &DispatchOrder) -> DispatchResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, shipment_id, customer_id, merchant_id, status, payment_status,
                assigned_courier, pickup_code, delivery_code,
                delivery_latitude, delivery_longitude, delivery_address,
                amount, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(order.id.to_string())
        .bind(order.shipment_id.to_string())
        .bind(order.customer_id.to_string())
        .bind(order.merchant_id.to_string())
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.assigned_courier.map(|id| id.to_string()))
        .bind(order.pickup_code.as_deref())
        .bind(order.delivery_code.as_deref())
        .bind(order.delivery_location.latitude)
        .bind(order.delivery_location.longitude)
        .bind(&order.delivery_address)
        .bind(order.amount)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<DispatchOrder>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_order(&r)).transpose()
    }

    async fn update_guarded(
        &self,
        order: &DispatchOrder,
        expected: OrderStatus,
    ) -> DispatchResult<bool> {
        // 守卫写入：只有存储中的状态仍为 expected 时才生效，
        // 并发迁移竞争中落败方不产生任何写入
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = ?, payment_status = ?, assigned_courier = ?,
                pickup_code = ?, delivery_code = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.assigned_courier.map(|id| id.to_string()))
        .bind(order.pickup_code.as_deref())
        .bind(order.delivery_code.as_deref())
        .bind(order.updated_at)
        .bind(order.id.to_string())
        .bind(expected)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists = sqlx::query("SELECT 1 FROM orders WHERE id = ?")
            .bind(order.id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(DispatchError::order_not_found(order.id));
        }
        Ok(false)
    }
}
