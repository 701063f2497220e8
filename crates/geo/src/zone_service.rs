//! 区域与邻近服务
//!
//! 维护配送员位置缓存和区域目录，提供邻近查询、
//! 邻近度评分、流量估算与区域统计

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_domain::{
    CourierPosition, DeliveryStatsRepository, DispatchResult, GeoPoint, GeoZone,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::GeoConfig;
use crate::distance::{bounding_box, haversine_km};
use crate::position_cache::PositionCache;
use crate::traffic::{self, TrafficEstimate};

/// 配送员跨区域移动通知
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneTransition {
    pub courier_id: Uuid,
    pub from_zone: Option<Uuid>,
    pub to_zone: Uuid,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyCourier {
    pub courier_id: Uuid,
    pub position: CourierPosition,
    pub distance_km: f64,
}

/// 区域聚合统计，用于建议定价
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneStats {
    pub zone_id: Uuid,
    /// 基准 1.0；高密度低时长的区域更便宜
    pub suggested_price_factor: f64,
    /// 0-100
    pub popularity: f64,
}

pub struct GeoZoneService {
    config: GeoConfig,
    zones: Vec<GeoZone>,
    positions: Arc<PositionCache>,
    stats_repository: Arc<dyn DeliveryStatsRepository>,
}

impl GeoZoneService {
    /// 区域目录在构造时整体校验，任何非法定义都会拒绝加载
    pub fn new(
        config: GeoConfig,
        zones: Vec<GeoZone>,
        positions: Arc<PositionCache>,
        stats_repository: Arc<dyn DeliveryStatsRepository>,
    ) -> DispatchResult<Self> {
        for zone in &zones {
            zone.validate()?;
        }
        info!(zone_count = zones.len(), "区域目录加载完成");
        Ok(Self {
            config,
            zones,
            positions,
            stats_repository,
        })
    }

    pub fn config(&self) -> &GeoConfig {
        &self.config
    }

    pub fn zones(&self) -> &[GeoZone] {
        &self.zones
    }

    /// 包含该点的区域；多个重叠时取中心最近的
    pub fn zone_of(&self, point: GeoPoint) -> Option<&GeoZone> {
        self.zones
            .iter()
            .filter_map(|z| {
                let d = haversine_km(point, z.center);
                (d <= z.radius_km).then_some((z, d))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(z, _)| z)
    }

    /// 位置上报。写入缓存并检测跨区域移动
    #[instrument(skip(self, position), fields(courier_id = %courier_id))]
    pub async fn update_position(
        &self,
        courier_id: Uuid,
        position: CourierPosition,
    ) -> DispatchResult<Option<ZoneTransition>> {
        position.location.validate()?;
        let previous = self.positions.update(courier_id, position).await;

        let new_zone = self.zone_of(position.location);
        let old_zone = previous.and_then(|p| self.zone_of(p.location));

        let transition = match (old_zone, new_zone) {
            (old, Some(new)) if old.map(|z| z.id) != Some(new.id) => Some(ZoneTransition {
                courier_id,
                from_zone: old.map(|z| z.id),
                to_zone: new.id,
                at: position.recorded_at,
            }),
            _ => None,
        };
        if let Some(t) = &transition {
            info!(
                from_zone = ?t.from_zone,
                to_zone = %t.to_zone,
                "配送员进入新区域"
            );
        }
        Ok(transition)
    }

    pub async fn position_of(&self, courier_id: Uuid) -> Option<CourierPosition> {
        self.positions.get(courier_id).await
    }

    /// 邻近配送员查询：包围盒粗筛后做精确大圆距离过滤。
    /// 无位置或位置过期的配送员不出现在结果中
    #[instrument(skip(self))]
    pub async fn nearby_couriers(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> DispatchResult<Vec<NearbyCourier>> {
        if radius_km <= 0.0 {
            return Err(courier_domain::DispatchError::validation(
                "查询半径必须为正",
            ));
        }
        let bb = bounding_box(center, radius_km);
        let now = Utc::now();
        let fresh = self
            .positions
            .fresh_positions(now, self.config.online_window_minutes)
            .await;

        let mut found: Vec<NearbyCourier> = fresh
            .into_iter()
            .filter(|(_, p)| bb.contains(p.location))
            .filter_map(|(id, p)| {
                let d = haversine_km(center, p.location);
                (d <= radius_km).then_some(NearbyCourier {
                    courier_id: id,
                    position: p,
                    distance_km: d,
                })
            })
            .collect();
        found.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        debug!(count = found.len(), "邻近查询完成");
        Ok(found)
    }

    /// 区域内: 100 − (d/r)·50；区域外随距离继续衰减到 0
    pub fn proximity_score(&self, point: GeoPoint, zone: &GeoZone) -> f64 {
        let d = haversine_km(point, zone.center);
        let r = zone.radius_km;
        if d <= r {
            100.0 - (d / r) * 50.0
        } else {
            (50.0 - ((d - r) / r) * 50.0).max(0.0)
        }
    }

    /// 目标时刻的流量估算，优先历史样本，不足回退静态分桶
    pub async fn estimate_traffic(
        &self,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> DispatchResult<TrafficEstimate> {
        let samples = self
            .stats_repository
            .delay_samples_near(
                point,
                self.config.traffic_sample_radius_km,
                self.config.traffic_window_days,
            )
            .await?;
        Ok(traffic::estimate(&self.config, &samples, at))
    }

    /// 按流量等级估算行驶耗时（分钟）
    pub async fn travel_duration_minutes(
        &self,
        from: GeoPoint,
        to: GeoPoint,
        at: DateTime<Utc>,
    ) -> DispatchResult<f64> {
        let estimate = self.estimate_traffic(from, at).await?;
        let distance = haversine_km(from, to);
        Ok(distance / estimate.expected_speed_kmh * 60.0)
    }

    /// 最近邻贪心排序，用于快速多站点估算。
    /// 返回 points 下标的访问顺序
    pub fn order_stops_greedy(&self, start: GeoPoint, points: &[GeoPoint]) -> Vec<usize> {
        let mut remaining: Vec<usize> = (0..points.len()).collect();
        let mut order = Vec::with_capacity(points.len());
        let mut current = start;
        while !remaining.is_empty() {
            let (pos, _) = remaining
                .iter()
                .enumerate()
                .map(|(pos, &idx)| (pos, haversine_km(current, points[idx])))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .expect("remaining is non-empty");
            let idx = remaining.swap_remove(pos);
            current = points[idx];
            order.push(idx);
        }
        order
    }

    /// 区域统计：密度高且平均时长短的区域定价因子更低、热度更高
    pub fn zone_stats(&self, zone: &GeoZone) -> ZoneStats {
        let popularity = (zone.delivery_density / 2.0).min(100.0);
        let duration_penalty = (zone.avg_delivery_minutes / 60.0).min(1.0);
        let density_discount = (zone.delivery_density / 500.0).min(0.2);
        ZoneStats {
            zone_id: zone.id,
            suggested_price_factor: 1.0 + duration_penalty * 0.3 - density_discount,
            popularity,
        }
    }
}
