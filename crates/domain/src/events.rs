//! 工作流事件
//!
//! 订单的每次状态迁移都会追加一条不可变事件记录，
//! 订单当前状态恒等于最新事件的 to_status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::OrderStatus;

/// 触发迁移的参与者
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Customer,
    Merchant,
    Courier,
    System,
    Scheduler,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Customer => "CUSTOMER",
            Actor::Merchant => "MERCHANT",
            Actor::Courier => "COURIER",
            Actor::System => "SYSTEM",
            Actor::Scheduler => "SCHEDULER",
        }
    }

    pub fn parse_str(s: &str) -> Option<Actor> {
        match s {
            "CUSTOMER" => Some(Actor::Customer),
            "MERCHANT" => Some(Actor::Merchant),
            "COURIER" => Some(Actor::Courier),
            "SYSTEM" => Some(Actor::System),
            "SCHEDULER" => Some(Actor::Scheduler),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub event_type: String,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl WorkflowEvent {
    pub fn transition(
        order_id: Uuid,
        event_type: impl Into<String>,
        from_status: OrderStatus,
        to_status: OrderStatus,
        actor: Actor,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            event_type: event_type.into(),
            from_status: Some(from_status),
            to_status,
            actor,
            occurred_at: Utc::now(),
            metadata,
        }
    }

    /// 不改变状态的告警事件（如质检未通过），from == to
    pub fn alert(
        order_id: Uuid,
        event_type: impl Into<String>,
        status: OrderStatus,
        actor: Actor,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            event_type: event_type.into(),
            from_status: Some(status),
            to_status: status,
            actor,
            occurred_at: Utc::now(),
            metadata,
        }
    }
}
