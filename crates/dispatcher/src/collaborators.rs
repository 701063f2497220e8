//! 外部协作方接口
//!
//! 支付与通知都是外部系统，暂时不可用属于可重试错误，
//! 由定时任务兜底而不是让订单直接失败

use async_trait::async_trait;
use courier_domain::{Actor, DispatchResult};
use uuid::Uuid;

/// 支付网关。charge 发起扣款，结果通过回调
/// （confirm_payment / fail_payment）异步到达
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, order_id: Uuid, amount: f64) -> DispatchResult<()>;
    async fn refund(&self, order_id: Uuid, amount: f64) -> DispatchResult<()>;
}

/// 通知下发，尽力而为；失败只记日志不影响工作流
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: Actor, order_id: Uuid, message: &str) -> DispatchResult<()>;
}
