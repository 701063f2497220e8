use async_trait::async_trait;
use courier_domain::{
    DispatchError, DispatchResult, GeoPoint, OpeningHours, RelayPoint, RelayPointRepository,
    RelayPointType,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

pub struct SqliteRelayPointRepository {
    pool: SqlitePool,
}

impl SqliteRelayPointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_point(row: &sqlx::sqlite::SqliteRow) -> DispatchResult<RelayPoint> {
        let id: String = row.try_get("id")?;
        let kind: String = row.try_get("kind")?;
        let capacity: i64 = row.try_get("capacity")?;
        let available: i64 = row.try_get("available_slots")?;
        let opening_hours: Option<String> = row.try_get("opening_hours")?;
        let opening_hours: Option<OpeningHours> = opening_hours
            .map(|s| serde_json::from_str(&s))
            .transpose()?;

        Ok(RelayPoint {
            id: parse_uuid(&id)?,
            name: row.try_get("name")?,
            location: GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?),
            kind: RelayPointType::parse_str(&kind)
                .ok_or_else(|| DispatchError::Serialization(format!("非法中转点类型: {kind}")))?,
            capacity: capacity as u32,
            available_slots: available as u32,
            opening_hours,
        })
    }
}

#[async_trait]
impl RelayPointRepository for SqliteRelayPointRepository {
    async fn save(&self, point: &RelayPoint) -> DispatchResult<()> {
        let opening_hours = point
            .opening_hours
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO relay_points (
                id, name, latitude, longitude, kind, capacity, available_slots, opening_hours
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(point.id.to_string())
        .bind(&point.name)
        .bind(point.location.latitude)
        .bind(point.location.longitude)
        .bind(point.kind.as_str())
        .bind(point.capacity as i64)
        .bind(point.available_slots as i64)
        .bind(opening_hours.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<RelayPoint>> {
        let row = sqlx::query("SELECT * FROM relay_points WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_point(&r)).transpose()
    }

    async fn list_by_types(&self, types: &[RelayPointType]) -> DispatchResult<Vec<RelayPoint>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!("SELECT * FROM relay_points WHERE kind IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for t in types {
            query = query.bind(t.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_point).collect()
    }

    async fn reserve_slot(&self, id: Uuid) -> DispatchResult<bool> {
        // 条件更新保证槽位数永不为负：满员时不产生写入
        let result = sqlx::query(
            "UPDATE relay_points SET available_slots = available_slots - 1 \
             WHERE id = ? AND available_slots > 0",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // 区分「已满」和「不存在」
        let exists = sqlx::query("SELECT 1 FROM relay_points WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(DispatchError::relay_point_not_found(id));
        }
        Ok(false)
    }

    async fn release_slot(&self, id: Uuid) -> DispatchResult<()> {
        let result = sqlx::query(
            "UPDATE relay_points SET available_slots = MIN(available_slots + 1, capacity) \
             WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::relay_point_not_found(id));
        }
        Ok(())
    }
}
