use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("数据库错误: {0}")]
    Database(String),
    #[error("运单未找到: {id}")]
    ShipmentNotFound { id: Uuid },
    #[error("配送员未找到: {id}")]
    CourierNotFound { id: Uuid },
    #[error("订单未找到: {id}")]
    OrderNotFound { id: Uuid },
    #[error("中转点未找到: {id}")]
    RelayPointNotFound { id: Uuid },
    #[error("状态冲突: 订单 {order_id} 期望状态 {expected}, 实际为 {actual}")]
    StateConflict {
        order_id: Uuid,
        expected: String,
        actual: String,
    },
    #[error("冲突: {0}")]
    Conflict(String),
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("外部服务暂时不可用: {service} - {message}")]
    Unavailable { service: String, message: String },
    #[error("定时任务重试耗尽: 订单 {order_id} 任务 {task_type}")]
    TimeoutExhausted { order_id: Uuid, task_type: String },
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn shipment_not_found(id: Uuid) -> Self {
        Self::ShipmentNotFound { id }
    }

    pub fn courier_not_found(id: Uuid) -> Self {
        Self::CourierNotFound { id }
    }

    pub fn order_not_found(id: Uuid) -> Self {
        Self::OrderNotFound { id }
    }

    pub fn relay_point_not_found(id: Uuid) -> Self {
        Self::RelayPointNotFound { id }
    }

    pub fn state_conflict<E, A>(order_id: Uuid, expected: E, actual: A) -> Self
    where
        E: Into<String>,
        A: Into<String>,
    {
        Self::StateConflict {
            order_id,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable<S1: Into<String>, S2: Into<String>>(service: S1, message: S2) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// 可通过定时任务重试机制恢复的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Unavailable { .. } | DispatchError::Database(_)
        )
    }

    /// 需要人工介入的终态错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::TimeoutExhausted { .. } | DispatchError::Internal(_)
        )
    }
}

#[cfg(feature = "sqlx-support")]
impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        DispatchError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        DispatchError::Internal(err.to_string())
    }
}
