use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{GeoPoint, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopKind {
    Pickup,
    Delivery,
    Waypoint,
    Depot,
}

/// 路线上的一个站点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub id: Uuid,
    pub kind: StopKind,
    pub location: GeoPoint,
    pub address: String,
    pub time_window: Option<TimeWindow>,
    /// 1（最低）到 5（最高）
    pub priority: u8,
    pub service_minutes: f64,
    /// 该站点装载/卸载的货重，用于容量可行性检查
    pub demand_kg: f64,
    /// 优化后的访问顺序，0 起始
    pub order_index: usize,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub estimated_departure: Option<DateTime<Utc>>,
    /// 与上一站的距离/耗时
    pub distance_from_previous_km: f64,
    pub duration_from_previous_minutes: f64,
}

impl RouteStop {
    pub fn new(kind: StopKind, location: GeoPoint, address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            location,
            address: address.into(),
            time_window: None,
            priority: 3,
            service_minutes: 5.0,
            demand_kg: 0.0,
            order_index: 0,
            estimated_arrival: None,
            estimated_departure: None,
            distance_from_previous_km: 0.0,
            duration_from_previous_minutes: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub courier_id: Uuid,
    pub stops: Vec<RouteStop>,
    pub total_distance_km: f64,
    pub total_duration_minutes: f64,
    pub total_service_minutes: f64,
    pub feasibility_score: f64,
    /// 直线距离 / 实际路线距离
    pub efficiency_ratio: f64,
    pub planned_at: DateTime<Utc>,
}

impl Route {
    /// 校验站点顺序字段构成 0..N-1 的排列
    pub fn has_valid_ordering(&self) -> bool {
        let mut seen = vec![false; self.stops.len()];
        for stop in &self.stops {
            match seen.get_mut(stop.order_index) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }
}

/// 可行性检查结果；不可行是合法的否定结果，不是错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteFeasibility {
    pub feasible: bool,
    pub score: f64,
    pub issues: Vec<String>,
}

impl RouteFeasibility {
    pub fn feasible(score: f64) -> Self {
        Self {
            feasible: true,
            score,
            issues: Vec::new(),
        }
    }

    pub fn infeasible(score: f64, issues: Vec<String>) -> Self {
        Self {
            feasible: false,
            score,
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_permutation() {
        let mut route = Route {
            id: Uuid::new_v4(),
            courier_id: Uuid::new_v4(),
            stops: vec![
                RouteStop::new(StopKind::Pickup, GeoPoint::new(48.85, 2.35), "a"),
                RouteStop::new(StopKind::Delivery, GeoPoint::new(48.86, 2.36), "b"),
            ],
            total_distance_km: 0.0,
            total_duration_minutes: 0.0,
            total_service_minutes: 0.0,
            feasibility_score: 100.0,
            efficiency_ratio: 1.0,
            planned_at: Utc::now(),
        };
        route.stops[1].order_index = 1;
        assert!(route.has_valid_ordering());

        route.stops[1].order_index = 0;
        assert!(!route.has_valid_ordering());
    }
}
