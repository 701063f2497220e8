use async_trait::async_trait;
use courier_domain::{DispatchResult, Route, RouteRepository, RouteStop};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

pub struct SqliteRouteRepository {
    pool: SqlitePool,
}

impl SqliteRouteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_route(row: &sqlx::sqlite::SqliteRow) -> DispatchResult<Route> {
        let id: String = row.try_get("id")?;
        let courier_id: String = row.try_get("courier_id")?;
        let stops: String = row.try_get("stops")?;
        let stops: Vec<RouteStop> = serde_json::from_str(&stops)?;

        Ok(Route {
            id: parse_uuid(&id)?,
            courier_id: parse_uuid(&courier_id)?,
            stops,
            total_distance_km: row.try_get("total_distance_km")?,
            total_duration_minutes: row.try_get("total_duration_minutes")?,
            total_service_minutes: row.try_get("total_service_minutes")?,
            feasibility_score: row.try_get("feasibility_score")?,
            efficiency_ratio: row.try_get("efficiency_ratio")?,
            planned_at: row.try_get("planned_at")?,
        })
    }
}

#[async_trait]
impl RouteRepository for SqliteRouteRepository {
    async fn save(&self, route: &Route) -> DispatchResult<()> {
        let stops = serde_json::to_string(&route.stops)?;
        sqlx::query(
            r#"
            INSERT INTO routes (
                id, courier_id, stops, total_distance_km, total_duration_minutes,
                total_service_minutes, feasibility_score, efficiency_ratio, planned_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(route.id.to_string())
        .bind(route.courier_id.to_string())
        .bind(stops)
        .bind(route.total_distance_km)
        .bind(route.total_duration_minutes)
        .bind(route.total_service_minutes)
        .bind(route.feasibility_score)
        .bind(route.efficiency_ratio)
        .bind(route.planned_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn active_route_for(&self, courier_id: Uuid) -> DispatchResult<Option<Route>> {
        let row = sqlx::query(
            "SELECT * FROM routes WHERE courier_id = ? ORDER BY planned_at DESC LIMIT 1",
        )
        .bind(courier_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_route(&r)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_util::test_db;
    use chrono::{Duration, Utc};
    use courier_domain::{GeoPoint, StopKind};

    fn route_for(courier_id: Uuid, planned_at: chrono::DateTime<Utc>) -> Route {
        let mut stops = vec![
            RouteStop::new(StopKind::Pickup, GeoPoint::new(48.85, 2.35), "仓库"),
            RouteStop::new(StopKind::Delivery, GeoPoint::new(48.86, 2.36), "客户"),
        ];
        stops[1].order_index = 1;
        Route {
            id: Uuid::new_v4(),
            courier_id,
            stops,
            total_distance_km: 1.6,
            total_duration_minutes: 12.0,
            total_service_minutes: 10.0,
            feasibility_score: 100.0,
            efficiency_ratio: 0.9,
            planned_at,
        }
    }

    #[tokio::test]
    async fn test_save_and_reload_stops() {
        let (db, _dir) = test_db().await;
        let repo = db.route_repository();
        let courier_id = Uuid::new_v4();
        let route = route_for(courier_id, Utc::now());
        repo.save(&route).await.unwrap();

        let loaded = repo.active_route_for(courier_id).await.unwrap().unwrap();
        assert_eq!(loaded.id, route.id);
        assert_eq!(loaded.stops.len(), 2);
        assert_eq!(loaded.stops[1].kind, StopKind::Delivery);
        assert!(loaded.has_valid_ordering());
    }

    #[tokio::test]
    async fn test_active_route_is_most_recent() {
        let (db, _dir) = test_db().await;
        let repo = db.route_repository();
        let courier_id = Uuid::new_v4();
        let old = route_for(courier_id, Utc::now() - Duration::hours(2));
        let recent = route_for(courier_id, Utc::now());
        repo.save(&old).await.unwrap();
        repo.save(&recent).await.unwrap();

        let loaded = repo.active_route_for(courier_id).await.unwrap().unwrap();
        assert_eq!(loaded.id, recent.id);
    }

    #[tokio::test]
    async fn test_no_route_returns_none() {
        let (db, _dir) = test_db().await;
        let repo = db.route_repository();
        assert!(repo
            .active_route_for(Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }
}
