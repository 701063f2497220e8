//! 配送员位置缓存
//!
//! 位置上报来自大量并发来源，按配送员 last-write-wins，
//! 不同配送员之间没有顺序保证

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use courier_domain::CourierPosition;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct PositionCache {
    positions: RwLock<HashMap<Uuid, CourierPosition>>,
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 覆盖写入，返回被替换的旧位置
    pub async fn update(&self, courier_id: Uuid, position: CourierPosition) -> Option<CourierPosition> {
        self.positions.write().await.insert(courier_id, position)
    }

    pub async fn get(&self, courier_id: Uuid) -> Option<CourierPosition> {
        self.positions.read().await.get(&courier_id).copied()
    }

    /// 仅返回在时效窗口内的位置；无位置或过期的配送员被静默跳过
    pub async fn fresh_positions(
        &self,
        now: DateTime<Utc>,
        max_age_minutes: i64,
    ) -> Vec<(Uuid, CourierPosition)> {
        let cutoff = now - Duration::minutes(max_age_minutes);
        self.positions
            .read()
            .await
            .iter()
            .filter(|(_, p)| p.recorded_at >= cutoff)
            .map(|(id, p)| (*id, *p))
            .collect()
    }

    pub async fn remove(&self, courier_id: Uuid) -> Option<CourierPosition> {
        self.positions.write().await.remove(&courier_id)
    }

    pub async fn len(&self) -> usize {
        self.positions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.positions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_domain::GeoPoint;

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = PositionCache::new();
        let id = Uuid::new_v4();
        let first = CourierPosition::new(GeoPoint::new(48.85, 2.35));
        let second = CourierPosition::new(GeoPoint::new(48.86, 2.36));

        assert!(cache.update(id, first).await.is_none());
        let replaced = cache.update(id, second).await.unwrap();
        assert_eq!(replaced.location, first.location);
        assert_eq!(cache.get(id).await.unwrap().location, second.location);
    }

    #[tokio::test]
    async fn test_stale_positions_excluded() {
        let cache = PositionCache::new();
        let now = Utc::now();

        let fresh_id = Uuid::new_v4();
        let stale_id = Uuid::new_v4();
        let mut stale = CourierPosition::new(GeoPoint::new(48.85, 2.35));
        stale.recorded_at = now - Duration::minutes(45);

        cache
            .update(fresh_id, CourierPosition::new(GeoPoint::new(48.86, 2.36)))
            .await;
        cache.update(stale_id, stale).await;

        let fresh = cache.fresh_positions(now, 30).await;
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].0, fresh_id);
    }
}
