use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{Capability, GeoPoint, OpeningHours};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayPointType {
    Warehouse,
    PartnerShop,
    Locker,
    PickupPoint,
}

impl RelayPointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayPointType::Warehouse => "WAREHOUSE",
            RelayPointType::PartnerShop => "PARTNER_SHOP",
            RelayPointType::Locker => "LOCKER",
            RelayPointType::PickupPoint => "PICKUP_POINT",
        }
    }

    pub fn parse_str(s: &str) -> Option<RelayPointType> {
        match s {
            "WAREHOUSE" => Some(RelayPointType::Warehouse),
            "PARTNER_SHOP" => Some(RelayPointType::PartnerShop),
            "LOCKER" => Some(RelayPointType::Locker),
            "PICKUP_POINT" => Some(RelayPointType::PickupPoint),
            _ => None,
        }
    }

    pub fn all() -> Vec<RelayPointType> {
        vec![
            RelayPointType::Warehouse,
            RelayPointType::PartnerShop,
            RelayPointType::Locker,
            RelayPointType::PickupPoint,
        ]
    }
}

/// 长途分段配送的中转设施
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayPoint {
    pub id: Uuid,
    pub name: String,
    pub location: GeoPoint,
    pub kind: RelayPointType,
    pub capacity: u32,
    /// 不变式：永不为负（u32 本身保证），预占通过条件更新递减
    pub available_slots: u32,
    pub opening_hours: Option<OpeningHours>,
}

impl RelayPoint {
    /// 缺失营业时段的中转点视为全天开放
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        match &self.opening_hours {
            Some(hours) => hours.is_open_at(at),
            None => true,
        }
    }

    pub fn has_free_slot(&self) -> bool {
        self.available_slots > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

/// 分段配送中的一个子段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySegment {
    pub index: usize,
    pub from_location: GeoPoint,
    pub from_label: String,
    pub to_location: GeoPoint,
    pub to_label: String,
    pub distance_km: f64,
    pub duration_minutes: f64,
    pub price: f64,
    pub required_capabilities: Vec<Capability>,
    pub assigned_courier: Option<Uuid>,
    pub status: SegmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialDeliveryPlan {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub segments: Vec<DeliverySegment>,
    pub relay_point_ids: Vec<Uuid>,
    pub total_distance_km: f64,
    pub total_duration_minutes: f64,
    /// 含多配送员协调加价
    pub total_price: f64,
    /// 由放宽条件的回退筛选产生
    pub is_fallback: bool,
    pub created_at: DateTime<Utc>,
}

impl PartialDeliveryPlan {
    pub fn is_complete(&self) -> bool {
        !self.segments.is_empty()
            && self
                .segments
                .iter()
                .all(|s| s.status == SegmentStatus::Completed)
    }
}
