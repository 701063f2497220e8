use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{GeoPoint, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    Matching,
    Assigned,
    InTransit,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::Matching => "MATCHING",
            ShipmentStatus::Assigned => "ASSIGNED",
            ShipmentStatus::InTransit => "IN_TRANSIT",
            ShipmentStatus::Delivered => "DELIVERED",
            ShipmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse_str(s: &str) -> Option<ShipmentStatus> {
        match s {
            "PENDING" => Some(ShipmentStatus::Pending),
            "MATCHING" => Some(ShipmentStatus::Matching),
            "ASSIGNED" => Some(ShipmentStatus::Assigned),
            "IN_TRANSIT" => Some(ShipmentStatus::InTransit),
            "DELIVERED" => Some(ShipmentStatus::Delivered),
            "CANCELLED" => Some(ShipmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Delivered | ShipmentStatus::Cancelled)
    }
}

/// 运单请求。进入匹配流程后视为不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub id: Uuid,
    pub pickup_location: GeoPoint,
    pub pickup_address: String,
    pub delivery_location: GeoPoint,
    pub delivery_address: String,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub fragile: bool,
    pub needs_refrigeration: bool,
    /// 1（最低）到 5（最高）
    pub priority: u8,
    /// 建议价格，EUR
    pub suggested_price: f64,
    pub price_negotiable: bool,
    pub pickup_window: Option<TimeWindow>,
    pub customer_id: Uuid,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentRequest {
    pub fn new(
        pickup_location: GeoPoint,
        pickup_address: impl Into<String>,
        delivery_location: GeoPoint,
        delivery_address: impl Into<String>,
        weight_kg: f64,
        volume_m3: f64,
        customer_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            pickup_location,
            pickup_address: pickup_address.into(),
            delivery_location,
            delivery_address: delivery_address.into(),
            weight_kg,
            volume_m3,
            fragile: false,
            needs_refrigeration: false,
            priority: 3,
            suggested_price: 0.0,
            price_negotiable: false,
            pickup_window: None,
            customer_id,
            status: ShipmentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_urgent(&self) -> bool {
        self.priority >= 4
    }

    /// 重件货物需要对应的搬运能力
    pub fn is_heavy(&self) -> bool {
        self.weight_kg > 20.0
    }

    pub fn update_status(&mut self, status: ShipmentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ShipmentRequest {
        ShipmentRequest::new(
            GeoPoint::new(48.85, 2.35),
            "1 rue de Rivoli, Paris",
            GeoPoint::new(48.86, 2.36),
            "10 rue Oberkampf, Paris",
            5.0,
            0.05,
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_defaults() {
        let s = sample();
        assert_eq!(s.status, ShipmentStatus::Pending);
        assert_eq!(s.priority, 3);
        assert!(!s.is_urgent());
        assert!(!s.is_heavy());
    }

    #[test]
    fn test_heavy_threshold() {
        let mut s = sample();
        s.weight_kg = 20.0;
        assert!(!s.is_heavy());
        s.weight_kg = 20.5;
        assert!(s.is_heavy());
    }
}
