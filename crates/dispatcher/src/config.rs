use serde::{Deserialize, Serialize};

/// 订单工作流参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// 各等待状态的超时时长（分钟）
    pub payment_timeout_minutes: i64,
    pub preparation_timeout_minutes: i64,
    pub pickup_timeout_minutes: i64,
    pub delivery_timeout_minutes: i64,
    /// 送达确认位置与送达地址的最大允许偏差
    pub delivery_radius_km: f64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            payment_timeout_minutes: 30,
            preparation_timeout_minutes: 120,
            pickup_timeout_minutes: 60,
            delivery_timeout_minutes: 240,
            delivery_radius_km: 0.1,
        }
    }
}

/// 定时任务执行器参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub sweep_interval_seconds: u64,
    /// 单次扫描认领的任务数上限
    pub batch_size: u32,
    pub retry_delay_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 60,
            batch_size: 50,
            retry_delay_minutes: 5,
        }
    }
}
