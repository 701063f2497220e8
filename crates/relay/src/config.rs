use courier_domain::RelayPointType;
use serde::{Deserialize, Serialize};

/// 分段配送参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 取送直线距离超过该值才启用分段配送
    pub trigger_distance_km: f64,
    /// 单段最大距离
    pub max_leg_km: f64,
    /// 首选中转点类型
    pub primary_types: Vec<RelayPointType>,
    /// 回退筛选时单段上限的放宽倍数
    pub fallback_leg_multiplier: f64,
    /// 链路搜索的中转点数量上限
    pub max_relay_points: usize,
    /// 分段基础费率，EUR/km
    pub base_rate_per_km: f64,
    /// 需要 >=2 项特殊能力时的分段加价系数
    pub complex_segment_multiplier: f64,
    /// 普通分段加价系数
    pub simple_segment_multiplier: f64,
    /// 多配送员协调总加价系数
    pub coordination_markup: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            trigger_distance_km: 100.0,
            max_leg_km: 50.0,
            primary_types: vec![RelayPointType::Warehouse, RelayPointType::PartnerShop],
            fallback_leg_multiplier: 1.5,
            max_relay_points: 8,
            base_rate_per_km: 0.8,
            complex_segment_multiplier: 1.3,
            simple_segment_multiplier: 1.1,
            coordination_markup: 1.15,
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> courier_domain::DispatchResult<()> {
        if self.max_leg_km <= 0.0 || self.trigger_distance_km <= 0.0 {
            return Err(courier_domain::DispatchError::config_error(
                "分段距离阈值必须为正",
            ));
        }
        if self.fallback_leg_multiplier < 1.0 {
            return Err(courier_domain::DispatchError::config_error(
                "回退放宽倍数不能小于 1",
            ));
        }
        if self.primary_types.is_empty() {
            return Err(courier_domain::DispatchError::config_error(
                "首选中转点类型不能为空",
            ));
        }
        Ok(())
    }
}
