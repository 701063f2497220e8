use std::collections::HashSet;

use async_trait::async_trait;
use courier_domain::{
    Capability, Courier, CourierRepository, DispatchError, DispatchResult, VehicleProfile,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

pub struct SqliteCourierRepository {
    pool: SqlitePool,
}

impl SqliteCourierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_courier(row: &sqlx::sqlite::SqliteRow) -> DispatchResult<Courier> {
        let id: String = row.try_get("id")?;
        let vehicle: String = row.try_get("vehicle")?;
        let vehicle: VehicleProfile = serde_json::from_str(&vehicle)?;
        let capabilities: String = row.try_get("capabilities")?;
        let capabilities: HashSet<Capability> = serde_json::from_str(&capabilities)?;
        let completed: i64 = row.try_get("completed_deliveries")?;

        Ok(Courier {
            id: parse_uuid(&id)?,
            name: row.try_get("name")?,
            vehicle,
            rating: row.try_get("rating")?,
            completed_deliveries: completed as u32,
            is_online: row.try_get("is_online")?,
            verified: row.try_get("verified")?,
            capabilities,
            registered_at: row.try_get("registered_at")?,
        })
    }
}

#[async_trait]
impl CourierRepository for SqliteCourierRepository {
    async fn save(&self, courier: &Courier) -> DispatchResult<()> {
        let vehicle = serde_json::to_string(&courier.vehicle)?;
        let capabilities = serde_json::to_string(&courier.capabilities)?;
        sqlx::query(
            r#"
            INSERT INTO couriers (
                id, name, vehicle, rating, completed_deliveries,
                is_online, verified, capabilities, registered_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(courier.id.to_string())
        .bind(&courier.name)
        .bind(vehicle)
        .bind(courier.rating)
        .bind(courier.completed_deliveries as i64)
        .bind(courier.is_online)
        .bind(courier.verified)
        .bind(capabilities)
        .bind(courier.registered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Courier>> {
        let row = sqlx::query("SELECT * FROM couriers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_courier(&r)).transpose()
    }

    async fn list_online(&self) -> DispatchResult<Vec<Courier>> {
        let rows = sqlx::query("SELECT * FROM couriers WHERE is_online = 1")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_courier).collect()
    }

    async fn update(&self, courier: &Courier) -> DispatchResult<()> {
        let vehicle = serde_json::to_string(&courier.vehicle)?;
        let capabilities = serde_json::to_string(&courier.capabilities)?;
        let result = sqlx::query(
            r#"
            UPDATE couriers SET
                name = ?, vehicle = ?, rating = ?, completed_deliveries = ?,
                is_online = ?, verified = ?, capabilities = ?
            WHERE id = ?
            "#,
        )
        .bind(&courier.name)
        .bind(vehicle)
        .bind(courier.rating)
        .bind(courier.completed_deliveries as i64)
        .bind(courier.is_online)
        .bind(courier.verified)
        .bind(capabilities)
        .bind(courier.id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::courier_not_found(courier.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_util::test_db;
    use courier_testing_utils::CourierBuilder;

    #[tokio::test]
    async fn test_save_and_reload_capabilities() {
        let (db, _dir) = test_db().await;
        let repo = db.courier_repository();
        let courier = CourierBuilder::new()
            .with_capability(Capability::FragileHandling)
            .with_capability(Capability::ExpressDelivery)
            .refrigerated()
            .build();

        repo.save(&courier).await.unwrap();
        let loaded = repo.find_by_id(courier.id).await.unwrap().unwrap();
        assert!(loaded.has_capability(Capability::FragileHandling));
        assert!(loaded.has_capability(Capability::ExpressDelivery));
        assert!(loaded.vehicle.refrigerated);
    }

    #[tokio::test]
    async fn test_list_online_excludes_offline() {
        let (db, _dir) = test_db().await;
        let repo = db.courier_repository();
        let online = CourierBuilder::new().build();
        let offline = CourierBuilder::new().offline().build();
        repo.save(&online).await.unwrap();
        repo.save(&offline).await.unwrap();

        let listed = repo.list_online().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, online.id);
    }

    #[tokio::test]
    async fn test_update_toggles_online() {
        let (db, _dir) = test_db().await;
        let repo = db.courier_repository();
        let mut courier = CourierBuilder::new().build();
        repo.save(&courier).await.unwrap();

        courier.is_online = false;
        repo.update(&courier).await.unwrap();
        assert!(repo.list_online().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (db, _dir) = test_db().await;
        let repo = db.courier_repository();
        let courier = CourierBuilder::new().build();
        let err = repo.update(&courier).await.unwrap_err();
        assert!(matches!(err, DispatchError::CourierNotFound { .. }));
    }
}
