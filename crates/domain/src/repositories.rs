//! 仓库接口定义
//!
//! 所有持久化访问都通过这些 trait 进行，便于注入内存实现做测试、
//! SQLite 实现做持久化。实现必须保证单条操作的原子性。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{
    Courier, DispatchOrder, OrderStatus, PartialDeliveryPlan, RelayPoint, RelayPointType, Route,
    ScheduledTask, ShipmentRequest, TaskType,
};
use crate::errors::DispatchResult;
use crate::events::WorkflowEvent;
use crate::value_objects::GeoPoint;

#[async_trait]
pub trait ShipmentRepository: Send + Sync {
    async fn save(&self, shipment: &ShipmentRequest) -> DispatchResult<()>;
    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<ShipmentRequest>>;
    async fn update(&self, shipment: &ShipmentRequest) -> DispatchResult<()>;
}

#[async_trait]
pub trait CourierRepository: Send + Sync {
    async fn save(&self, courier: &Courier) -> DispatchResult<()>;
    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Courier>>;
    /// 匹配候选池：当前在线的配送员
    async fn list_online(&self) -> DispatchResult<Vec<Courier>>;
    async fn update(&self, courier: &Courier) -> DispatchResult<()>;
}

#[async_trait]
pub trait RouteRepository: Send + Sync {
    async fn save(&self, route: &Route) -> DispatchResult<()>;
    /// 配送员当前执行中的路线，用于绕路评分
    async fn active_route_for(&self, courier_id: Uuid) -> DispatchResult<Option<Route>>;
}

#[async_trait]
pub trait RelayPointRepository: Send + Sync {
    async fn save(&self, point: &RelayPoint) -> DispatchResult<()>;
    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<RelayPoint>>;
    async fn list_by_types(&self, types: &[RelayPointType]) -> DispatchResult<Vec<RelayPoint>>;
    /// 条件递减可用槽位；已满时返回 false，槽位数永不为负
    async fn reserve_slot(&self, id: Uuid) -> DispatchResult<bool>;
    async fn release_slot(&self, id: Uuid) -> DispatchResult<()>;
}

#[async_trait]
pub trait PartialDeliveryPlanRepository: Send + Sync {
    async fn save(&self, plan: &PartialDeliveryPlan) -> DispatchResult<()>;
    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<PartialDeliveryPlan>>;
    async fn update(&self, plan: &PartialDeliveryPlan) -> DispatchResult<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save(&self, order: &DispatchOrder) -> DispatchResult<()>;
    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<DispatchOrder>>;
    /// 受保护更新：仅当存储中的状态仍为 expected 时写入。
    /// 返回 false 表示守卫失败（并发迁移竞争中落败），不产生任何写入
    async fn update_guarded(
        &self,
        order: &DispatchOrder,
        expected: OrderStatus,
    ) -> DispatchResult<bool>;
}

#[async_trait]
pub trait WorkflowEventRepository: Send + Sync {
    /// 事件只追加，永不修改
    async fn append(&self, event: &WorkflowEvent) -> DispatchResult<()>;
    async fn list_for_order(&self, order_id: Uuid) -> DispatchResult<Vec<WorkflowEvent>>;
    async fn latest_for_order(&self, order_id: Uuid) -> DispatchResult<Option<WorkflowEvent>>;
}

#[async_trait]
pub trait ScheduledTaskRepository: Send + Sync {
    async fn save(&self, task: &ScheduledTask) -> DispatchResult<()>;
    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<ScheduledTask>>;
    /// 原子认领一批到期任务：认领即将 active 置否，
    /// 多个调度进程并发扫描时同一行最多被一个进程取到
    async fn claim_due_batch(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DispatchResult<Vec<ScheduledTask>>;
    /// 重试：递增计数并重新激活到新的执行时间
    async fn reschedule(
        &self,
        task_id: Uuid,
        execute_at: DateTime<Utc>,
        retry_count: u32,
    ) -> DispatchResult<()>;
    async fn mark_completed(&self, task_id: Uuid, result: &str) -> DispatchResult<()>;
    /// 重试耗尽后的永久失败：inactive + completed + 失败结果
    async fn mark_failed_permanent(&self, task_id: Uuid, result: &str) -> DispatchResult<()>;
    async fn find_active(
        &self,
        order_id: Uuid,
        task_type: TaskType,
    ) -> DispatchResult<Option<ScheduledTask>>;
    /// 终态迁移时批量取消订单所有任务
    async fn cancel_for_order(&self, order_id: Uuid) -> DispatchResult<u32>;
    /// 选择性取消某一类型任务（如取件完成后取消取件超时）
    async fn cancel_by_type(&self, order_id: Uuid, task_type: TaskType) -> DispatchResult<u32>;
}

/// 历史配送延迟样本，用于交通状况估算
#[derive(Debug, Clone, Copy)]
pub struct DelaySample {
    pub delay_minutes: f64,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeliveryStatsRepository: Send + Sync {
    /// 指定点附近、回溯窗口内的延迟样本
    async fn delay_samples_near(
        &self,
        point: GeoPoint,
        radius_km: f64,
        window_days: u32,
    ) -> DispatchResult<Vec<DelaySample>>;
    async fn record_delay(
        &self,
        point: GeoPoint,
        delay_minutes: f64,
        recorded_at: DateTime<Utc>,
    ) -> DispatchResult<()>;
}

/// 客户与配送员的历史关系，用于偏好评分
#[async_trait]
pub trait CourierHistoryRepository: Send + Sync {
    async fn completed_between(&self, customer_id: Uuid, courier_id: Uuid)
        -> DispatchResult<u32>;
    /// 最近 limit 条评价的平均分
    async fn recent_review_average(
        &self,
        courier_id: Uuid,
        limit: u32,
    ) -> DispatchResult<Option<f64>>;
    async fn is_blacklisted(&self, customer_id: Uuid, courier_id: Uuid) -> DispatchResult<bool>;
}
