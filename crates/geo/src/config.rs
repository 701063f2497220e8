use serde::{Deserialize, Serialize};

/// 静态时段流量分桶，作为历史数据不足时的回退。
/// 经验常量，按部署城市可调
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficBuckets {
    /// 高峰时段（小时，含端点）
    pub peak_hours: Vec<u8>,
    /// 中等时段
    pub moderate_hours: Vec<u8>,
}

impl Default for TrafficBuckets {
    fn default() -> Self {
        Self {
            peak_hours: vec![7, 8, 9, 17, 18, 19],
            moderate_hours: vec![11, 12, 13, 14],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// 超过该时长未上报位置的配送员视为离线
    pub online_window_minutes: i64,
    /// 历史延迟估算所需的最少样本数，不足则回退静态分桶
    pub min_traffic_samples: usize,
    /// 历史延迟回溯窗口
    pub traffic_window_days: u32,
    /// 延迟样本聚合半径
    pub traffic_sample_radius_km: f64,
    /// 平均延迟阈值（分钟）：低于 moderate 为畅通，高于 high 为拥堵
    pub delay_moderate_minutes: f64,
    pub delay_high_minutes: f64,
    /// 各流量等级的期望行驶速度
    pub speed_low_kmh: f64,
    pub speed_moderate_kmh: f64,
    pub speed_high_kmh: f64,
    pub buckets: TrafficBuckets,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            online_window_minutes: 30,
            min_traffic_samples: 5,
            traffic_window_days: 28,
            traffic_sample_radius_km: 3.0,
            delay_moderate_minutes: 5.0,
            delay_high_minutes: 15.0,
            speed_low_kmh: 40.0,
            speed_moderate_kmh: 25.0,
            speed_high_kmh: 15.0,
            buckets: TrafficBuckets::default(),
        }
    }
}
