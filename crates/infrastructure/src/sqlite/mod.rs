//! 仓库 trait 的 SQLite 实现
//!
//! UUID 以 TEXT 存储，复杂嵌套结构（路线站点、配送子段等）
//! 以 JSON TEXT 存储；状态枚举以 TEXT 存储

mod courier_repository;
mod event_repository;
mod order_repository;
mod plan_repository;
mod relay_repository;
mod route_repository;
mod shipment_repository;
mod stats_repository;
mod task_repository;

pub use courier_repository::SqliteCourierRepository;
pub use event_repository::SqliteEventRepository;
pub use order_repository::SqliteOrderRepository;
pub use plan_repository::SqlitePlanRepository;
pub use relay_repository::SqliteRelayPointRepository;
pub use route_repository::SqliteRouteRepository;
pub use shipment_repository::SqliteShipmentRepository;
pub use stats_repository::{SqliteHistoryRepository, SqliteStatsRepository};
pub use task_repository::SqliteTaskRepository;

use courier_domain::{DispatchError, DispatchResult};
use uuid::Uuid;

pub(crate) fn parse_uuid(s: &str) -> DispatchResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DispatchError::Serialization(format!("非法 UUID {s}: {e}")))
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::database::Database;
    use tempfile::TempDir;

    /// 每个测试一个独立的临时数据库文件
    pub async fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().expect("创建临时目录失败");
        let db = Database::new_embedded(dir.path().join("courier.db"))
            .await
            .expect("初始化测试数据库失败");
        (db, dir)
    }
}
