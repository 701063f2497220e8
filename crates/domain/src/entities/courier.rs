use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{Capability, GeoPoint};

/// 配送员实时位置，由位置上报持续覆盖（last-write-wins）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CourierPosition {
    pub location: GeoPoint,
    /// 朝向，度，0 = 正北
    pub heading: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl CourierPosition {
    pub fn new(location: GeoPoint) -> Self {
        Self {
            location,
            heading: None,
            speed_kmh: None,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    pub max_weight_kg: f64,
    pub max_volume_m3: f64,
    pub max_speed_kmh: f64,
    pub refrigerated: bool,
    pub careful_handling: bool,
}

impl Default for VehicleProfile {
    fn default() -> Self {
        Self {
            max_weight_kg: 30.0,
            max_volume_m3: 0.5,
            max_speed_kmh: 50.0,
            refrigerated: false,
            careful_handling: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    pub vehicle: VehicleProfile,
    /// 0.0 - 5.0
    pub rating: f64,
    pub completed_deliveries: u32,
    pub is_online: bool,
    pub verified: bool,
    pub capabilities: HashSet<Capability>,
    pub registered_at: DateTime<Utc>,
}

impl Courier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            vehicle: VehicleProfile::default(),
            rating: 5.0,
            completed_deliveries: 0,
            is_online: false,
            verified: false,
            capabilities: HashSet::new(),
            registered_at: Utc::now(),
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn can_carry(&self, weight_kg: f64, volume_m3: f64) -> bool {
        weight_kg <= self.vehicle.max_weight_kg && volume_m3 <= self.vehicle.max_volume_m3
    }

    /// 经验档位加成，封顶 30
    pub fn experience_bonus(&self) -> f64 {
        if self.completed_deliveries >= 100 {
            30.0
        } else if self.completed_deliveries >= 50 {
            20.0
        } else if self.completed_deliveries >= 20 {
            10.0
        } else if self.completed_deliveries >= 5 {
            5.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_check() {
        let c = Courier::new("marie");
        assert!(c.can_carry(30.0, 0.5));
        assert!(!c.can_carry(30.1, 0.1));
        assert!(!c.can_carry(1.0, 0.6));
    }

    #[test]
    fn test_experience_tiers() {
        let mut c = Courier::new("luc");
        assert_eq!(c.experience_bonus(), 0.0);
        c.completed_deliveries = 5;
        assert_eq!(c.experience_bonus(), 5.0);
        c.completed_deliveries = 20;
        assert_eq!(c.experience_bonus(), 10.0);
        c.completed_deliveries = 50;
        assert_eq!(c.experience_bonus(), 20.0);
        c.completed_deliveries = 100;
        assert_eq!(c.experience_bonus(), 30.0);
    }
}
