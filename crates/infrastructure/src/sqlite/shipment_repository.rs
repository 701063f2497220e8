use async_trait::async_trait;
use courier_domain::{
    DispatchError, DispatchResult, GeoPoint, ShipmentRepository, ShipmentRequest, ShipmentStatus,
    TimeWindow,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

pub struct SqliteShipmentRepository {
    pool: SqlitePool,
}

impl SqliteShipmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_shipment(row: &sqlx::sqlite::SqliteRow) -> DispatchResult<ShipmentRequest> {
        let id: String = row.try_get("id")?;
        let customer_id: String = row.try_get("customer_id")?;
        let status: String = row.try_get("status")?;
        let pickup_window: Option<String> = row.try_get("pickup_window")?;
        let pickup_window: Option<TimeWindow> = pickup_window
            .map(|s| serde_json::from_str(&s))
            .transpose()?;
        let priority: i64 = row.try_get("priority")?;

        Ok(ShipmentRequest {
            id: parse_uuid(&id)?,
            pickup_location: GeoPoint::new(
                row.try_get("pickup_latitude")?,
                row.try_get("pickup_longitude")?,
            ),
            pickup_address: row.try_get("pickup_address")?,
            delivery_location: GeoPoint::new(
                row.try_get("delivery_latitude")?,
                row.try_get("delivery_longitude")?,
            ),
            delivery_address: row.try_get("delivery_address")?,
            weight_kg: row.try_get("weight_kg")?,
            volume_m3: row.try_get("volume_m3")?,
            fragile: row.try_get("fragile")?,
            needs_refrigeration: row.try_get("needs_refrigeration")?,
            priority: priority as u8,
            suggested_price: row.try_get("suggested_price")?,
            price_negotiable: row.try_get("price_negotiable")?,
            pickup_window,
            customer_id: parse_uuid(&customer_id)?,
            status: ShipmentStatus::parse_str(&status)
                .ok_or_else(|| DispatchError::Serialization(format!("非法运单状态: {status}")))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn bind_fields<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        shipment: &'q ShipmentRequest,
        window_json: &'q Option<String>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        query
            .bind(shipment.pickup_location.latitude)
            .bind(shipment.pickup_location.longitude)
            .bind(&shipment.pickup_address)
            .bind(shipment.delivery_location.latitude)
            .bind(shipment.delivery_location.longitude)
            .bind(&shipment.delivery_address)
            .bind(shipment.weight_kg)
            .bind(shipment.volume_m3)
            .bind(shipment.fragile)
            .bind(shipment.needs_refrigeration)
            .bind(shipment.priority as i64)
            .bind(shipment.suggested_price)
            .bind(shipment.price_negotiable)
            .bind(window_json.as_deref())
            .bind(shipment.customer_id.to_string())
            .bind(shipment.status.as_str())
            .bind(shipment.created_at)
            .bind(shipment.updated_at)
    }
}

#[async_trait]
impl ShipmentRepository for SqliteShipmentRepository {
    async fn save(&self, shipment: &ShipmentRequest) -> DispatchResult<()> {
        let window_json = shipment
            .pickup_window
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let query = sqlx::query(
            r#"
            INSERT INTO shipments (
                pickup_latitude, pickup_longitude, pickup_address,
                delivery_latitude, delivery_longitude, delivery_address,
                weight_kg, volume_m3, fragile, needs_refrigeration,
                priority, suggested_price, price_negotiable, pickup_window,
                customer_id, status, created_at, updated_at, id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        );
        Self::bind_fields(query, shipment, &window_json)
            .bind(shipment.id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<ShipmentRequest>> {
        let row = sqlx::query("SELECT * FROM shipments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_shipment(&r)).transpose()
    }

    async fn update(&self, shipment: &ShipmentRequest) -> DispatchResult<()> {
        let window_json = shipment
            .pickup_window
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let query = sqlx::query(
            r#"
            UPDATE shipments SET
                pickup_latitude = ?, pickup_longitude = ?, pickup_address = ?,
                delivery_latitude = ?, delivery_longitude = ?, delivery_address = ?,
                weight_kg = ?, volume_m3 = ?, fragile = ?, needs_refrigeration = ?,
                priority = ?, suggested_price = ?, price_negotiable = ?, pickup_window = ?,
                customer_id = ?, status = ?, created_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        );
        let result = Self::bind_fields(query, shipment, &window_json)
            .bind(shipment.id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::shipment_not_found(shipment.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_util::test_db;
    use chrono::{Duration, Utc};
    use courier_testing_utils::ShipmentBuilder;

    #[tokio::test]
    async fn test_save_and_reload() {
        let (db, _dir) = test_db().await;
        let repo = db.shipment_repository();
        let window = TimeWindow::new(Utc::now(), Utc::now() + Duration::hours(2)).unwrap();
        let shipment = ShipmentBuilder::new()
            .fragile()
            .with_priority(4)
            .with_pickup_window(window)
            .build();

        repo.save(&shipment).await.unwrap();
        let loaded = repo.find_by_id(shipment.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, shipment.id);
        assert!(loaded.fragile);
        assert_eq!(loaded.priority, 4);
        assert_eq!(loaded.status, ShipmentStatus::Pending);
        assert!(loaded.pickup_window.is_some());
    }

    #[tokio::test]
    async fn test_update_status() {
        let (db, _dir) = test_db().await;
        let repo = db.shipment_repository();
        let mut shipment = ShipmentBuilder::new().build();
        repo.save(&shipment).await.unwrap();

        shipment.update_status(ShipmentStatus::Matching);
        repo.update(&shipment).await.unwrap();
        let loaded = repo.find_by_id(shipment.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ShipmentStatus::Matching);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (db, _dir) = test_db().await;
        let repo = db.shipment_repository();
        let shipment = ShipmentBuilder::new().build();
        let err = repo.update(&shipment).await.unwrap_err();
        assert!(matches!(err, DispatchError::ShipmentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let (db, _dir) = test_db().await;
        let repo = db.shipment_repository();
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }
}
