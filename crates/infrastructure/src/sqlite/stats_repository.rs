use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use courier_domain::{
    CourierHistoryRepository, DelaySample, DeliveryStatsRepository, DispatchResult, GeoPoint,
};
use courier_geo::distance::{bounding_box, haversine_km};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// 历史延迟样本存取，供交通状况估算使用
pub struct SqliteStatsRepository {
    pool: SqlitePool,
}

impl SqliteStatsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryStatsRepository for SqliteStatsRepository {
    async fn delay_samples_near(
        &self,
        point: GeoPoint,
        radius_km: f64,
        window_days: u32,
    ) -> DispatchResult<Vec<DelaySample>> {
        // 先用经纬度包围盒走索引粗筛，再用球面距离精筛
        let bb = bounding_box(point, radius_km);
        let cutoff = Utc::now() - Duration::days(window_days as i64);
        let rows = sqlx::query(
            r#"
            SELECT latitude, longitude, delay_minutes, recorded_at
            FROM delivery_delays
            WHERE recorded_at >= ?
              AND latitude BETWEEN ? AND ?
              AND longitude BETWEEN ? AND ?
            "#,
        )
        .bind(cutoff)
        .bind(bb.min_lat)
        .bind(bb.max_lat)
        .bind(bb.min_lon)
        .bind(bb.max_lon)
        .fetch_all(&self.pool)
        .await?;

        let mut samples = Vec::new();
        for row in rows {
            let at = GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?);
            if haversine_km(point, at) <= radius_km {
                samples.push(DelaySample {
                    delay_minutes: row.try_get("delay_minutes")?,
                    recorded_at: row.try_get("recorded_at")?,
                });
            }
        }
        Ok(samples)
    }

    async fn record_delay(
        &self,
        point: GeoPoint,
        delay_minutes: f64,
        recorded_at: DateTime<Utc>,
    ) -> DispatchResult<()> {
        sqlx::query(
            "INSERT INTO delivery_delays (latitude, longitude, delay_minutes, recorded_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(point.latitude)
        .bind(point.longitude)
        .bind(delay_minutes)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// 客户与配送员的历史关系查询，供匹配偏好评分使用
pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record_completed(
        &self,
        customer_id: Uuid,
        courier_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> DispatchResult<()> {
        sqlx::query(
            "INSERT INTO delivery_history (customer_id, courier_id, completed_at) \
             VALUES (?, ?, ?)",
        )
        .bind(customer_id.to_string())
        .bind(courier_id.to_string())
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_review(
        &self,
        courier_id: Uuid,
        rating: f64,
        created_at: DateTime<Utc>,
    ) -> DispatchResult<()> {
        sqlx::query(
            "INSERT INTO courier_reviews (courier_id, rating, created_at) VALUES (?, ?, ?)",
        )
        .bind(courier_id.to_string())
        .bind(rating)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_to_blacklist(
        &self,
        customer_id: Uuid,
        courier_id: Uuid,
    ) -> DispatchResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO courier_blacklist (customer_id, courier_id) VALUES (?, ?)",
        )
        .bind(customer_id.to_string())
        .bind(courier_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CourierHistoryRepository for SqliteHistoryRepository {
    async fn completed_between(
        &self,
        customer_id: Uuid,
        courier_id: Uuid,
    ) -> DispatchResult<u32> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM delivery_history \
             WHERE customer_id = ? AND courier_id = ?",
        )
        .bind(customer_id.to_string())
        .bind(courier_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u32)
    }

    async fn recent_review_average(
        &self,
        courier_id: Uuid,
        limit: u32,
    ) -> DispatchResult<Option<f64>> {
        // 子查询先取最近 limit 条，再求平均；无评价时 AVG 为 NULL
        let row = sqlx::query(
            r#"
            SELECT AVG(rating) AS avg_rating FROM (
                SELECT rating FROM courier_reviews
                WHERE courier_id = ?
                ORDER BY created_at DESC
                LIMIT ?
            )
            "#,
        )
        .bind(courier_id.to_string())
        .bind(limit as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("avg_rating")?)
    }

    async fn is_blacklisted(&self, customer_id: Uuid, courier_id: Uuid) -> DispatchResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM courier_blacklist WHERE customer_id = ? AND courier_id = ?",
        )
        .bind(customer_id.to_string())
        .bind(courier_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_util::test_db;

    #[tokio::test]
    async fn test_delay_samples_filter_by_radius_and_window() {
        let (db, _dir) = test_db().await;
        let repo = db.stats_repository();
        let center = GeoPoint::new(48.85, 2.35);
        let now = Utc::now();

        repo.record_delay(center, 12.0, now).await.unwrap();
        // 约 2.2 公里外
        repo.record_delay(GeoPoint::new(48.87, 2.35), 8.0, now)
            .await
            .unwrap();
        // 范围内但超出回溯窗口
        repo.record_delay(center, 30.0, now - Duration::days(10))
            .await
            .unwrap();

        let samples = repo.delay_samples_near(center, 1.0, 7).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].delay_minutes, 12.0);

        let wider = repo.delay_samples_near(center, 5.0, 7).await.unwrap();
        assert_eq!(wider.len(), 2);
    }

    #[tokio::test]
    async fn test_completed_between_counts_pair_only() {
        let (db, _dir) = test_db().await;
        let repo = db.history_repository();
        let customer = Uuid::new_v4();
        let courier = Uuid::new_v4();
        let other = Uuid::new_v4();
        let now = Utc::now();

        repo.record_completed(customer, courier, now).await.unwrap();
        repo.record_completed(customer, courier, now).await.unwrap();
        repo.record_completed(customer, other, now).await.unwrap();

        assert_eq!(repo.completed_between(customer, courier).await.unwrap(), 2);
        assert_eq!(repo.completed_between(other, courier).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_review_average_over_recent_window() {
        let (db, _dir) = test_db().await;
        let repo = db.history_repository();
        let courier = Uuid::new_v4();
        let now = Utc::now();

        assert!(repo
            .recent_review_average(courier, 10)
            .await
            .unwrap()
            .is_none());

        repo.record_review(courier, 2.0, now - Duration::hours(3))
            .await
            .unwrap();
        repo.record_review(courier, 4.0, now - Duration::hours(2))
            .await
            .unwrap();
        repo.record_review(courier, 5.0, now - Duration::hours(1))
            .await
            .unwrap();

        // 最近 2 条：4.0 和 5.0
        let avg = repo.recent_review_average(courier, 2).await.unwrap();
        assert_eq!(avg, Some(4.5));
        let all = repo.recent_review_average(courier, 10).await.unwrap();
        assert!((all.unwrap() - 11.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_blacklist_lookup() {
        let (db, _dir) = test_db().await;
        let repo = db.history_repository();
        let customer = Uuid::new_v4();
        let courier = Uuid::new_v4();

        assert!(!repo.is_blacklisted(customer, courier).await.unwrap());
        repo.add_to_blacklist(customer, courier).await.unwrap();
        repo.add_to_blacklist(customer, courier).await.unwrap();
        assert!(repo.is_blacklisted(customer, courier).await.unwrap());
    }
}
