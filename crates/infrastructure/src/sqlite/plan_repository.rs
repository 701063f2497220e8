use async_trait::async_trait;
use courier_domain::{
    DeliverySegment, DispatchError, DispatchResult, PartialDeliveryPlan,
    PartialDeliveryPlanRepository,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

pub struct SqlitePlanRepository {
    pool: SqlitePool,
}

impl SqlitePlanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_plan(row: &sqlx::sqlite::SqliteRow) -> DispatchResult<PartialDeliveryPlan> {
        let id: String = row.try_get("id")?;
        let shipment_id: String = row.try_get("shipment_id")?;
        let segments: String = row.try_get("segments")?;
        let segments: Vec<DeliverySegment> = serde_json::from_str(&segments)?;
        let relay_point_ids: String = row.try_get("relay_point_ids")?;
        let relay_point_ids: Vec<Uuid> = serde_json::from_str(&relay_point_ids)?;

        Ok(PartialDeliveryPlan {
            id: parse_uuid(&id)?,
            shipment_id: parse_uuid(&shipment_id)?,
            segments,
            relay_point_ids,
            total_distance_km: row.try_get("total_distance_km")?,
            total_duration_minutes: row.try_get("total_duration_minutes")?,
            total_price: row.try_get("total_price")?,
            is_fallback: row.try_get("is_fallback")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl PartialDeliveryPlanRepository for SqlitePlanRepository {
    async fn save(&self, plan: &PartialDeliveryPlan) -> DispatchResult<()> {
        let segments = serde_json::to_string(&plan.segments)?;
        let relay_point_ids = serde_json::to_string(&plan.relay_point_ids)?;
        sqlx::query(
            r#"
            INSERT INTO delivery_plans (
                id, shipment_id, segments, relay_point_ids, total_distance_km,
                total_duration_minutes, total_price, is_fallback, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan.id.to_string())
        .bind(plan.shipment_id.to_string())
        .bind(segments)
        .bind(relay_point_ids)
        .bind(plan.total_distance_km)
        .bind(plan.total_duration_minutes)
        .bind(plan.total_price)
        .bind(plan.is_fallback)
        .bind(plan.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<PartialDeliveryPlan>> {
        let row = sqlx::query("SELECT * FROM delivery_plans WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_plan(&r)).transpose()
    }

    async fn update(&self, plan: &PartialDeliveryPlan) -> DispatchResult<()> {
        let segments = serde_json::to_string(&plan.segments)?;
        let relay_point_ids = serde_json::to_string(&plan.relay_point_ids)?;
        let result = sqlx::query(
            r#"
            UPDATE delivery_plans SET
                segments = ?, relay_point_ids = ?, total_distance_km = ?,
                total_duration_minutes = ?, total_price = ?, is_fallback = ?
            WHERE id = ?
            "#,
        )
        .bind(segments)
        .bind(relay_point_ids)
        .bind(plan.total_distance_km)
        .bind(plan.total_duration_minutes)
        .bind(plan.total_price)
        .bind(plan.is_fallback)
        .bind(plan.id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::internal(format!(
                "更新不存在的配送方案: {}",
                plan.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_util::test_db;
    use chrono::Utc;
    use courier_domain::{Capability, GeoPoint, SegmentStatus};

    fn sample_plan() -> PartialDeliveryPlan {
        let relay_id = Uuid::new_v4();
        PartialDeliveryPlan {
            id: Uuid::new_v4(),
            shipment_id: Uuid::new_v4(),
            segments: vec![
                DeliverySegment {
                    index: 0,
                    from_location: GeoPoint::new(0.0, 0.0),
                    from_label: "取件点".to_string(),
                    to_location: GeoPoint::new(0.42, 0.0),
                    to_label: "entrepot_a".to_string(),
                    distance_km: 46.7,
                    duration_minutes: 62.3,
                    price: 41.07,
                    required_capabilities: vec![Capability::FragileHandling],
                    assigned_courier: None,
                    status: SegmentStatus::Pending,
                },
                DeliverySegment {
                    index: 1,
                    from_location: GeoPoint::new(0.42, 0.0),
                    from_label: "entrepot_a".to_string(),
                    to_location: GeoPoint::new(0.84, 0.0),
                    to_label: "送达点".to_string(),
                    distance_km: 46.7,
                    duration_minutes: 62.3,
                    price: 41.07,
                    required_capabilities: vec![Capability::FragileHandling],
                    assigned_courier: None,
                    status: SegmentStatus::Pending,
                },
            ],
            relay_point_ids: vec![relay_id],
            total_distance_km: 93.4,
            total_duration_minutes: 124.6,
            total_price: 94.46,
            is_fallback: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_reload_segments() {
        let (db, _dir) = test_db().await;
        let repo = db.plan_repository();
        let plan = sample_plan();
        repo.save(&plan).await.unwrap();

        let loaded = repo.find_by_id(plan.id).await.unwrap().unwrap();
        assert_eq!(loaded.segments.len(), 2);
        assert_eq!(loaded.relay_point_ids, plan.relay_point_ids);
        assert_eq!(
            loaded.segments[0].required_capabilities,
            vec![Capability::FragileHandling]
        );
        assert!(!loaded.is_complete());
    }

    #[tokio::test]
    async fn test_update_segment_status() {
        let (db, _dir) = test_db().await;
        let repo = db.plan_repository();
        let mut plan = sample_plan();
        repo.save(&plan).await.unwrap();

        let courier_id = Uuid::new_v4();
        plan.segments[0].assigned_courier = Some(courier_id);
        plan.segments[0].status = SegmentStatus::Assigned;
        repo.update(&plan).await.unwrap();

        let loaded = repo.find_by_id(plan.id).await.unwrap().unwrap();
        assert_eq!(loaded.segments[0].status, SegmentStatus::Assigned);
        assert_eq!(loaded.segments[0].assigned_courier, Some(courier_id));
        assert_eq!(loaded.segments[1].status, SegmentStatus::Pending);
    }
}
