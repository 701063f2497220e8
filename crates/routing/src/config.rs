use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 路线优化参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    /// 固定随机种子可得到可复现的优化结果，供测试使用；
    /// None 时从系统熵播种
    pub seed: Option<u64>,
    /// 无车辆信息时的估算速度
    pub default_speed_kmh: f64,
    /// 低于该分且存在阻塞问题时放弃优化
    pub feasibility_floor: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            seed: None,
            default_speed_kmh: 30.0,
            feasibility_floor: 40.0,
        }
    }
}

/// 单次规划请求的约束
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteConstraints {
    pub max_distance_km: Option<f64>,
    pub max_duration_minutes: Option<f64>,
    pub max_weight_kg: Option<f64>,
    pub return_to_start: bool,
    pub start_time: Option<DateTime<Utc>>,
}
