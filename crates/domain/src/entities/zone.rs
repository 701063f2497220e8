use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DispatchError, DispatchResult};
use crate::value_objects::{GeoPoint, TimeWindow};

/// 配送区域及其统计数据，用于流量和定价估算
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoZone {
    pub id: Uuid,
    pub name: String,
    pub center: GeoPoint,
    pub radius_km: f64,
    /// 每平方公里每天的配送量
    pub delivery_density: f64,
    pub avg_delivery_minutes: f64,
    pub popular_windows: Vec<TimeWindow>,
}

impl GeoZone {
    /// 区域定义在加载时校验，非法定义直接拒绝
    pub fn validate(&self) -> DispatchResult<()> {
        self.center.validate()?;
        if self.radius_km <= 0.0 {
            return Err(DispatchError::validation(format!(
                "区域 {} 半径必须为正: {}",
                self.name, self.radius_km
            )));
        }
        if self.delivery_density < 0.0 {
            return Err(DispatchError::validation(format!(
                "区域 {} 配送密度不能为负",
                self.name
            )));
        }
        if self.avg_delivery_minutes < 0.0 {
            return Err(DispatchError::validation(format!(
                "区域 {} 平均配送时长不能为负",
                self.name
            )));
        }
        Ok(())
    }
}
