//! 订单生命周期状态机
//!
//! 每次迁移都要求订单仍处于期望状态（受保护更新），
//! 竞争失败返回状态冲突且不产生任何副作用；
//! 每次迁移追加一条不可变工作流事件

use std::sync::Arc;

use chrono::{Duration, Utc};
use courier_domain::{
    Actor, DispatchError, DispatchOrder, DispatchResult, GeoPoint, OrderRepository, OrderStatus,
    PaymentStatus, ScheduledTask, ScheduledTaskRepository, TaskType, WorkflowEvent,
    WorkflowEventRepository,
};
use courier_geo::haversine_km;
use rand::Rng;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::collaborators::{Notifier, PaymentGateway};
use crate::config::WorkflowConfig;

pub struct DispatchWorkflow {
    config: WorkflowConfig,
    orders: Arc<dyn OrderRepository>,
    events: Arc<dyn WorkflowEventRepository>,
    tasks: Arc<dyn ScheduledTaskRepository>,
    payments: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl DispatchWorkflow {
    pub fn new(
        config: WorkflowConfig,
        orders: Arc<dyn OrderRepository>,
        events: Arc<dyn WorkflowEventRepository>,
        tasks: Arc<dyn ScheduledTaskRepository>,
        payments: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            orders,
            events,
            tasks,
            payments,
            notifier,
        }
    }

    /// 创建订单并记录初始事件
    #[instrument(skip(self, delivery_location, delivery_address))]
    pub async fn create_order(
        &self,
        shipment_id: Uuid,
        customer_id: Uuid,
        merchant_id: Uuid,
        delivery_location: GeoPoint,
        delivery_address: String,
        amount: f64,
    ) -> DispatchResult<DispatchOrder> {
        delivery_location.validate()?;
        if amount <= 0.0 {
            return Err(DispatchError::validation("订单金额必须为正"));
        }
        let order = DispatchOrder::new(
            shipment_id,
            customer_id,
            merchant_id,
            delivery_location,
            delivery_address,
            amount,
        );
        self.orders.save(&order).await?;
        self.events
            .append(&WorkflowEvent {
                id: Uuid::new_v4(),
                order_id: order.id,
                event_type: "ORDER_CREATED".to_string(),
                from_status: None,
                to_status: OrderStatus::Created,
                actor: Actor::Customer,
                occurred_at: Utc::now(),
                metadata: json!({ "amount": order.amount }),
            })
            .await?;
        info!(order_id = %order.id, amount = order.amount, "订单已创建");
        Ok(order)
    }

    /// 发起支付。网关暂时不可用不阻塞订单，支付超时任务兜底
    #[instrument(skip(self))]
    pub async fn request_payment(&self, order_id: Uuid) -> DispatchResult<DispatchOrder> {
        let order = self.load(order_id).await?;
        let order = self
            .transition(
                order,
                OrderStatus::Created,
                OrderStatus::PaymentPending,
                Actor::System,
                "PAYMENT_REQUESTED",
                json!({}),
            )
            .await?;
        self.schedule_timeout(
            order.id,
            TaskType::PaymentTimeout,
            self.config.payment_timeout_minutes,
        )
        .await?;
        if let Err(err) = self.payments.charge(order.id, order.amount).await {
            warn!(order_id = %order.id, error = %err, "扣款发起失败，等待重试或超时");
        }
        self.notify(Actor::Customer, order.id, "请完成支付").await;
        Ok(order)
    }

    /// 支付成功回调。重复投递时幂等返回
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, order_id: Uuid) -> DispatchResult<DispatchOrder> {
        let mut order = self.load(order_id).await?;
        if order.status == OrderStatus::Confirmed && order.payment_status == PaymentStatus::Paid {
            debug!(order_id = %order.id, "重复的支付确认，忽略");
            return Ok(order);
        }
        order.payment_status = PaymentStatus::Paid;
        let order = self
            .transition(
                order,
                OrderStatus::PaymentPending,
                OrderStatus::Confirmed,
                Actor::System,
                "PAYMENT_CONFIRMED",
                json!({}),
            )
            .await?;
        self.tasks
            .cancel_by_type(order.id, TaskType::PaymentTimeout)
            .await?;
        self.notify(Actor::Merchant, order.id, "新订单待备货").await;
        Ok(order)
    }

    /// 支付失败回调（或支付超时）
    #[instrument(skip(self))]
    pub async fn fail_payment(
        &self,
        order_id: Uuid,
        actor: Actor,
        reason: &str,
    ) -> DispatchResult<DispatchOrder> {
        let mut order = self.load(order_id).await?;
        if order.status == OrderStatus::PaymentFailed {
            return Ok(order);
        }
        order.payment_status = PaymentStatus::Failed;
        let order = self
            .transition(
                order,
                OrderStatus::PaymentPending,
                OrderStatus::PaymentFailed,
                actor,
                "PAYMENT_FAILED",
                json!({ "reason": reason }),
            )
            .await?;
        self.tasks.cancel_for_order(order.id).await?;
        self.notify(Actor::Customer, order.id, "支付未完成，订单已关闭")
            .await;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn start_preparation(&self, order_id: Uuid) -> DispatchResult<DispatchOrder> {
        let order = self.load(order_id).await?;
        let order = self
            .transition(
                order,
                OrderStatus::Confirmed,
                OrderStatus::Preparing,
                Actor::Merchant,
                "PREPARATION_STARTED",
                json!({}),
            )
            .await?;
        self.schedule_timeout(
            order.id,
            TaskType::PreparationTimeout,
            self.config.preparation_timeout_minutes,
        )
        .await?;
        Ok(order)
    }

    /// 备货完成。质检不通过时订单留在 PREPARING，
    /// 只追加一条告警事件，不算失败
    #[instrument(skip(self))]
    pub async fn complete_preparation(
        &self,
        order_id: Uuid,
        quality_ok: bool,
    ) -> DispatchResult<DispatchOrder> {
        let mut order = self.load(order_id).await?;
        if !quality_ok {
            if order.status != OrderStatus::Preparing {
                return Err(DispatchError::state_conflict(
                    order.id,
                    OrderStatus::Preparing.as_str(),
                    order.status.as_str(),
                ));
            }
            self.events
                .append(&WorkflowEvent::alert(
                    order.id,
                    "QUALITY_CHECK_FAILED",
                    OrderStatus::Preparing,
                    Actor::Merchant,
                    json!({}),
                ))
                .await?;
            warn!(order_id = %order.id, "质检未通过，订单保持备货中");
            self.notify(Actor::Merchant, order.id, "质检未通过，请重新备货")
                .await;
            return Ok(order);
        }

        order.pickup_code = Some(generate_code());
        let order = self
            .transition(
                order,
                OrderStatus::Preparing,
                OrderStatus::ReadyForPickup,
                Actor::Merchant,
                "PREPARATION_COMPLETED",
                json!({}),
            )
            .await?;
        self.tasks
            .cancel_by_type(order.id, TaskType::PreparationTimeout)
            .await?;
        self.schedule_timeout(
            order.id,
            TaskType::PickupTimeout,
            self.config.pickup_timeout_minutes,
        )
        .await?;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn assign_courier(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
    ) -> DispatchResult<DispatchOrder> {
        let mut order = self.load(order_id).await?;
        if order.status == OrderStatus::Assigned && order.assigned_courier == Some(courier_id) {
            return Ok(order);
        }
        order.assigned_courier = Some(courier_id);
        let order = self
            .transition(
                order,
                OrderStatus::ReadyForPickup,
                OrderStatus::Assigned,
                Actor::System,
                "COURIER_ASSIGNED",
                json!({ "courier_id": courier_id }),
            )
            .await?;
        self.notify(Actor::Courier, order.id, "新配送任务已指派").await;
        Ok(order)
    }

    /// 取件确认需出示一次性取件码，使用后即清空
    #[instrument(skip(self, code))]
    pub async fn confirm_pickup(&self, order_id: Uuid, code: &str) -> DispatchResult<DispatchOrder> {
        let mut order = self.load(order_id).await?;
        if order.status == OrderStatus::PickedUp {
            return Ok(order);
        }
        if order.status != OrderStatus::Assigned {
            return Err(DispatchError::state_conflict(
                order.id,
                OrderStatus::Assigned.as_str(),
                order.status.as_str(),
            ));
        }
        if order.pickup_code.as_deref() != Some(code) {
            return Err(DispatchError::conflict("取件码不正确或已失效"));
        }
        order.pickup_code = None;
        order.delivery_code = Some(generate_code());
        let order = self
            .transition(
                order,
                OrderStatus::Assigned,
                OrderStatus::PickedUp,
                Actor::Courier,
                "PICKUP_CONFIRMED",
                json!({}),
            )
            .await?;
        self.tasks
            .cancel_by_type(order.id, TaskType::PickupTimeout)
            .await?;
        self.schedule_timeout(
            order.id,
            TaskType::DeliveryTimeout,
            self.config.delivery_timeout_minutes,
        )
        .await?;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn start_delivery(&self, order_id: Uuid) -> DispatchResult<DispatchOrder> {
        let order = self.load(order_id).await?;
        self.transition(
            order,
            OrderStatus::PickedUp,
            OrderStatus::InDelivery,
            Actor::Courier,
            "DELIVERY_STARTED",
            json!({}),
        )
        .await
    }

    /// 送达确认：一次性送达码 + 上报位置必须在送达地址附近
    #[instrument(skip(self, code, position))]
    pub async fn confirm_delivery(
        &self,
        order_id: Uuid,
        code: &str,
        position: GeoPoint,
    ) -> DispatchResult<DispatchOrder> {
        let mut order = self.load(order_id).await?;
        if order.status == OrderStatus::Delivered {
            return Ok(order);
        }
        if order.status != OrderStatus::InDelivery {
            return Err(DispatchError::state_conflict(
                order.id,
                OrderStatus::InDelivery.as_str(),
                order.status.as_str(),
            ));
        }
        if order.delivery_code.as_deref() != Some(code) {
            return Err(DispatchError::conflict("送达码不正确或已失效"));
        }
        position.validate()?;
        let distance = haversine_km(position, order.delivery_location);
        if distance > self.config.delivery_radius_km {
            return Err(DispatchError::validation(format!(
                "上报位置距送达地址 {:.0} 米，超出允许范围",
                distance * 1000.0
            )));
        }
        order.delivery_code = None;
        let order = self
            .transition(
                order,
                OrderStatus::InDelivery,
                OrderStatus::Delivered,
                Actor::Courier,
                "DELIVERY_CONFIRMED",
                json!({ "distance_km": distance }),
            )
            .await?;
        self.tasks
            .cancel_by_type(order.id, TaskType::DeliveryTimeout)
            .await?;
        self.notify(Actor::Customer, order.id, "订单已送达").await;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn complete_order(&self, order_id: Uuid) -> DispatchResult<DispatchOrder> {
        let order = self.load(order_id).await?;
        let order = self
            .transition(
                order,
                OrderStatus::Delivered,
                OrderStatus::Completed,
                Actor::System,
                "ORDER_COMPLETED",
                json!({}),
            )
            .await?;
        self.tasks.cancel_for_order(order.id).await?;
        Ok(order)
    }

    /// 取消订单，按取消时所处阶段执行补偿：
    /// 已支付的退款；已指派释放配送员；已取件安排退回商家。
    /// 受保护迁移先提交，守卫失败时任何补偿都不触发
    #[instrument(skip(self, reason))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor: Actor,
        reason: &str,
    ) -> DispatchResult<DispatchOrder> {
        let mut order = self.load(order_id).await?;
        if order.status == OrderStatus::Cancelled {
            return Ok(order);
        }
        if !order.status.is_cancellable() {
            return Err(DispatchError::conflict(format!(
                "订单处于 {}，不可取消",
                order.status.as_str()
            )));
        }
        let prior = order.status;
        let was_assigned = order.assigned_courier.is_some();
        if prior == OrderStatus::Assigned {
            order.assigned_courier = None;
        }

        let mut order = self
            .transition(
                order,
                prior,
                OrderStatus::Cancelled,
                actor,
                "ORDER_CANCELLED",
                json!({ "reason": reason, "cancelled_from": prior.as_str() }),
            )
            .await?;
        self.tasks.cancel_for_order(order.id).await?;

        if order.payment_status == PaymentStatus::Paid {
            match self.payments.refund(order.id, order.amount).await {
                Ok(()) => {
                    order.payment_status = PaymentStatus::Refunded;
                    if !self.orders.update_guarded(&order, OrderStatus::Cancelled).await? {
                        warn!(order_id = %order.id, "退款状态写入失败，订单记录仍为已支付");
                    }
                }
                Err(err) => {
                    // 取消已提交，退款由独立任务补偿，避免整单重放造成重复退款
                    warn!(order_id = %order.id, error = %err, "退款暂不可用，已安排重试");
                    self.schedule_timeout(order.id, TaskType::RefundRetry, 0).await?;
                }
            }
        }

        if matches!(prior, OrderStatus::PickedUp | OrderStatus::InDelivery) {
            // 包裹已在途，立即安排退回
            let task = ScheduledTask::new(order.id, TaskType::ReturnToMerchant, Utc::now());
            self.tasks.save(&task).await?;
        }

        self.notify(Actor::Customer, order.id, "订单已取消").await;
        self.notify(Actor::Merchant, order.id, "订单已取消").await;
        if was_assigned {
            self.notify(Actor::Courier, order.id, "配送任务已取消").await;
        }
        info!(order_id = %order.id, from = prior.as_str(), reason, "订单已取消");
        Ok(order)
    }

    // ---- 定时任务处理器，必须幂等：条件已被直接操作解决时是空操作 ----

    pub async fn handle_payment_timeout(&self, order_id: Uuid) -> DispatchResult<String> {
        let order = self.load(order_id).await?;
        if order.status != OrderStatus::PaymentPending {
            return Ok(format!("订单已处于 {}，无需处理", order.status.as_str()));
        }
        match self
            .fail_payment(order_id, Actor::Scheduler, "支付超时")
            .await
        {
            Ok(_) => Ok("支付超时，订单已关闭".to_string()),
            // 与直接回调竞争落败等同于条件已解决
            Err(DispatchError::StateConflict { .. }) => Ok("并发迁移竞争落败，跳过".to_string()),
            Err(err) => Err(err),
        }
    }

    pub async fn handle_preparation_timeout(&self, order_id: Uuid) -> DispatchResult<String> {
        let order = self.load(order_id).await?;
        if order.status != OrderStatus::Preparing {
            return Ok(format!("订单已处于 {}，无需处理", order.status.as_str()));
        }
        match self
            .cancel_order(order_id, Actor::Scheduler, "备货超时")
            .await
        {
            Ok(_) => Ok("备货超时，订单已取消".to_string()),
            Err(DispatchError::StateConflict { .. }) => Ok("并发迁移竞争落败，跳过".to_string()),
            Err(err) => Err(err),
        }
    }

    pub async fn handle_pickup_timeout(&self, order_id: Uuid) -> DispatchResult<String> {
        let order = self.load(order_id).await?;
        if !matches!(
            order.status,
            OrderStatus::ReadyForPickup | OrderStatus::Assigned
        ) {
            return Ok(format!("订单已处于 {}，无需处理", order.status.as_str()));
        }
        match self
            .cancel_order(order_id, Actor::Scheduler, "取件超时")
            .await
        {
            Ok(_) => Ok("取件超时，订单已取消".to_string()),
            Err(DispatchError::StateConflict { .. }) => Ok("并发迁移竞争落败，跳过".to_string()),
            Err(err) => Err(err),
        }
    }

    pub async fn handle_delivery_timeout(&self, order_id: Uuid) -> DispatchResult<String> {
        let order = self.load(order_id).await?;
        if !matches!(order.status, OrderStatus::PickedUp | OrderStatus::InDelivery) {
            return Ok(format!("订单已处于 {}，无需处理", order.status.as_str()));
        }
        match self
            .cancel_order(order_id, Actor::Scheduler, "配送超时")
            .await
        {
            Ok(_) => Ok("配送超时，订单已取消并安排退回".to_string()),
            Err(DispatchError::StateConflict { .. }) => Ok("并发迁移竞争落败，跳过".to_string()),
            Err(err) => Err(err),
        }
    }

    pub async fn handle_return_to_merchant(&self, order_id: Uuid) -> DispatchResult<String> {
        let order = self.load(order_id).await?;
        self.events
            .append(&WorkflowEvent::alert(
                order.id,
                "RETURN_TO_MERCHANT",
                order.status,
                Actor::Scheduler,
                json!({}),
            ))
            .await?;
        self.notify(Actor::Merchant, order.id, "包裹将退回，请注意接收")
            .await;
        Ok("退回商家流程已通知".to_string())
    }

    /// 取消时退款网关不可用的补偿路径。已退款则为空操作
    pub async fn handle_refund_retry(&self, order_id: Uuid) -> DispatchResult<String> {
        let mut order = self.load(order_id).await?;
        if order.payment_status != PaymentStatus::Paid {
            return Ok(format!(
                "支付状态已为 {}，无需处理",
                order.payment_status.as_str()
            ));
        }
        self.payments.refund(order.id, order.amount).await?;
        order.payment_status = PaymentStatus::Refunded;
        if !self.orders.update_guarded(&order, order.status).await? {
            warn!(order_id = %order.id, "退款状态写入失败，订单记录仍为已支付");
        }
        self.notify(Actor::Customer, order.id, "退款已到账").await;
        info!(order_id = %order.id, amount = order.amount, "退款补偿完成");
        Ok("退款已补发".to_string())
    }

    // ---- 内部 ----

    /// 受保护迁移：仅当订单仍处于 expected 时写入新状态，
    /// 成功后追加事件。守卫失败不产生任何副作用
    async fn transition(
        &self,
        mut order: DispatchOrder,
        expected: OrderStatus,
        target: OrderStatus,
        actor: Actor,
        event_type: &str,
        metadata: serde_json::Value,
    ) -> DispatchResult<DispatchOrder> {
        if order.status != expected {
            return Err(DispatchError::state_conflict(
                order.id,
                expected.as_str(),
                order.status.as_str(),
            ));
        }
        if !expected.can_transition_to(target) {
            return Err(DispatchError::internal(format!(
                "非法状态迁移: {} -> {}",
                expected.as_str(),
                target.as_str()
            )));
        }
        order.update_status(target);
        if !self.orders.update_guarded(&order, expected).await? {
            let actual = self
                .orders
                .find_by_id(order.id)
                .await?
                .map(|o| o.status.as_str().to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            return Err(DispatchError::state_conflict(
                order.id,
                expected.as_str(),
                actual,
            ));
        }
        self.events
            .append(&WorkflowEvent::transition(
                order.id, event_type, expected, target, actor, metadata,
            ))
            .await?;
        debug!(
            order_id = %order.id,
            from = expected.as_str(),
            to = target.as_str(),
            event_type,
            "状态迁移完成"
        );
        Ok(order)
    }

    /// 同一订单同一类型至多一个 active 任务：旧的先失效再建新的
    async fn schedule_timeout(
        &self,
        order_id: Uuid,
        task_type: TaskType,
        delay_minutes: i64,
    ) -> DispatchResult<ScheduledTask> {
        self.tasks.cancel_by_type(order_id, task_type).await?;
        let task = ScheduledTask::new(
            order_id,
            task_type,
            Utc::now() + Duration::minutes(delay_minutes),
        );
        self.tasks.save(&task).await?;
        debug!(order_id = %order_id, task_type = task_type.as_str(), delay_minutes, "超时任务已排期");
        Ok(task)
    }

    async fn load(&self, order_id: Uuid) -> DispatchResult<DispatchOrder> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or(DispatchError::order_not_found(order_id))
    }

    async fn notify(&self, recipient: Actor, order_id: Uuid, message: &str) {
        if let Err(err) = self.notifier.send(recipient, order_id, message).await {
            warn!(order_id = %order_id, error = %err, "通知发送失败");
        }
    }
}

/// 六位一次性验证码
fn generate_code() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000))
}
