use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    PaymentPending,
    PaymentFailed,
    Confirmed,
    Preparing,
    ReadyForPickup,
    Assigned,
    PickedUp,
    InDelivery,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::PaymentPending => "PAYMENT_PENDING",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::ReadyForPickup => "READY_FOR_PICKUP",
            OrderStatus::Assigned => "ASSIGNED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::InDelivery => "IN_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse_str(s: &str) -> Option<OrderStatus> {
        match s {
            "CREATED" => Some(OrderStatus::Created),
            "PAYMENT_PENDING" => Some(OrderStatus::PaymentPending),
            "PAYMENT_FAILED" => Some(OrderStatus::PaymentFailed),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "PREPARING" => Some(OrderStatus::Preparing),
            "READY_FOR_PICKUP" => Some(OrderStatus::ReadyForPickup),
            "ASSIGNED" => Some(OrderStatus::Assigned),
            "PICKED_UP" => Some(OrderStatus::PickedUp),
            "IN_DELIVERY" => Some(OrderStatus::InDelivery),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "COMPLETED" => Some(OrderStatus::Completed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// 主路径上的下一个状态
    pub fn next_in_flow(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Created => Some(OrderStatus::PaymentPending),
            OrderStatus::PaymentPending => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::ReadyForPickup),
            OrderStatus::ReadyForPickup => Some(OrderStatus::Assigned),
            OrderStatus::Assigned => Some(OrderStatus::PickedUp),
            OrderStatus::PickedUp => Some(OrderStatus::InDelivery),
            OrderStatus::InDelivery => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => Some(OrderStatus::Completed),
            _ => None,
        }
    }

    /// 状态迁移图：主路径 + PAYMENT_FAILED 分支 + 取消分支
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if target == OrderStatus::Cancelled {
            return self.is_cancellable();
        }
        if *self == OrderStatus::PaymentPending && target == OrderStatus::PaymentFailed {
            return true;
        }
        self.next_in_flow() == Some(target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::PaymentFailed
        )
    }

    /// DELIVERED 之前（不含）的任意状态可以取消
    pub fn is_cancellable(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Completed
                | OrderStatus::Cancelled
                | OrderStatus::PaymentFailed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse_str(s: &str) -> Option<PaymentStatus> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "PAID" => Some(PaymentStatus::Paid),
            "FAILED" => Some(PaymentStatus::Failed),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// 派送订单聚合根。仅通过受保护的工作流迁移修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOrder {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub customer_id: Uuid,
    pub merchant_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub assigned_courier: Option<Uuid>,
    /// 一次性取件码，使用后清空
    pub pickup_code: Option<String>,
    /// 一次性送达码，使用后清空
    pub delivery_code: Option<String>,
    pub delivery_location: GeoPoint,
    pub delivery_address: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DispatchOrder {
    pub fn new(
        shipment_id: Uuid,
        customer_id: Uuid,
        merchant_id: Uuid,
        delivery_location: GeoPoint,
        delivery_address: impl Into<String>,
        amount: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            shipment_id,
            customer_id,
            merchant_id,
            status: OrderStatus::Created,
            payment_status: PaymentStatus::Pending,
            assigned_courier: None,
            pickup_code: None,
            delivery_code: None,
            delivery_location,
            delivery_address: delivery_address.into(),
            amount,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_path() {
        let mut status = OrderStatus::Created;
        let expected = [
            OrderStatus::PaymentPending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::ReadyForPickup,
            OrderStatus::Assigned,
            OrderStatus::PickedUp,
            OrderStatus::InDelivery,
            OrderStatus::Delivered,
            OrderStatus::Completed,
        ];
        for next in expected {
            assert!(status.can_transition_to(next), "{status:?} -> {next:?}");
            status = next;
        }
        assert!(status.is_terminal());
    }

    #[test]
    fn test_payment_failure_branch() {
        assert!(OrderStatus::PaymentPending.can_transition_to(OrderStatus::PaymentFailed));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::PaymentFailed));
        assert!(OrderStatus::PaymentFailed.is_terminal());
    }

    #[test]
    fn test_cancellation_window() {
        assert!(OrderStatus::Created.is_cancellable());
        assert!(OrderStatus::InDelivery.is_cancellable());
        assert!(!OrderStatus::Delivered.is_cancellable());
        assert!(!OrderStatus::Cancelled.is_cancellable());
        assert!(OrderStatus::InDelivery.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_no_skipping() {
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Confirmed));
        assert!(!OrderStatus::Assigned.can_transition_to(OrderStatus::InDelivery));
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            OrderStatus::Created,
            OrderStatus::PaymentPending,
            OrderStatus::ReadyForPickup,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse_str(s.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse_str("UNKNOWN"), None);
    }
}
