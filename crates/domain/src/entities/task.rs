use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    PaymentTimeout,
    PreparationTimeout,
    PickupTimeout,
    DeliveryTimeout,
    ReturnToMerchant,
    RefundRetry,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::PaymentTimeout => "PAYMENT_TIMEOUT",
            TaskType::PreparationTimeout => "PREPARATION_TIMEOUT",
            TaskType::PickupTimeout => "PICKUP_TIMEOUT",
            TaskType::DeliveryTimeout => "DELIVERY_TIMEOUT",
            TaskType::ReturnToMerchant => "RETURN_TO_MERCHANT",
            TaskType::RefundRetry => "REFUND_RETRY",
        }
    }

    pub fn parse_str(s: &str) -> Option<TaskType> {
        match s {
            "PAYMENT_TIMEOUT" => Some(TaskType::PaymentTimeout),
            "PREPARATION_TIMEOUT" => Some(TaskType::PreparationTimeout),
            "PICKUP_TIMEOUT" => Some(TaskType::PickupTimeout),
            "DELIVERY_TIMEOUT" => Some(TaskType::DeliveryTimeout),
            "RETURN_TO_MERCHANT" => Some(TaskType::ReturnToMerchant),
            "REFUND_RETRY" => Some(TaskType::RefundRetry),
            _ => None,
        }
    }
}

/// 持久化的延迟任务行，由周期扫描认领执行。
/// 不变式：同一订单同一类型最多一个 active 任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub order_id: Uuid,
    pub task_type: TaskType,
    pub execute_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub active: bool,
    pub completed: bool,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn new(order_id: Uuid, task_type: TaskType, execute_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            task_type,
            execute_at,
            retry_count: 0,
            max_retries: 3,
            active: true,
            completed: false,
            result: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.completed && self.execute_at <= now
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_due_check() {
        let now = Utc::now();
        let mut task = ScheduledTask::new(Uuid::new_v4(), TaskType::PaymentTimeout, now);
        assert!(task.is_due(now));
        task.execute_at = now + Duration::minutes(5);
        assert!(!task.is_due(now));
        task.execute_at = now;
        task.active = false;
        assert!(!task.is_due(now));
    }

    #[test]
    fn test_retry_exhaustion() {
        let mut task = ScheduledTask::new(Uuid::new_v4(), TaskType::PickupTimeout, Utc::now());
        assert!(!task.retries_exhausted());
        task.retry_count = 3;
        assert!(task.retries_exhausted());
    }
}
