//! 嵌入式 SQLite 数据库：连接池、迁移和仓库工厂

use std::path::Path;

use courier_domain::DispatchResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use crate::sqlite::{
    SqliteCourierRepository, SqliteEventRepository, SqliteHistoryRepository,
    SqliteOrderRepository, SqlitePlanRepository, SqliteRelayPointRepository,
    SqliteRouteRepository, SqliteShipmentRepository, SqliteStatsRepository,
    SqliteTaskRepository,
};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// 打开（必要时创建）数据库文件，启用 WAL 和外键约束，
    /// 随后执行建表迁移
    pub async fn new_embedded(path: impl AsRef<Path>) -> DispatchResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        debug!(path = %path.as_ref().display(), "嵌入式数据库已就绪");
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> DispatchResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> DispatchResult<()> {
        debug!("执行数据库迁移");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shipments (
                id TEXT PRIMARY KEY,
                pickup_latitude REAL NOT NULL,
                pickup_longitude REAL NOT NULL,
                pickup_address TEXT NOT NULL,
                delivery_latitude REAL NOT NULL,
                delivery_longitude REAL NOT NULL,
                delivery_address TEXT NOT NULL,
                weight_kg REAL NOT NULL,
                volume_m3 REAL NOT NULL,
                fragile INTEGER NOT NULL DEFAULT 0,
                needs_refrigeration INTEGER NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 3,
                suggested_price REAL NOT NULL DEFAULT 0,
                price_negotiable INTEGER NOT NULL DEFAULT 0,
                pickup_window TEXT,
                customer_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS couriers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                vehicle TEXT NOT NULL,
                rating REAL NOT NULL DEFAULT 5.0,
                completed_deliveries INTEGER NOT NULL DEFAULT 0,
                is_online INTEGER NOT NULL DEFAULT 0,
                verified INTEGER NOT NULL DEFAULT 0,
                capabilities TEXT NOT NULL DEFAULT '[]',
                registered_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS routes (
                id TEXT PRIMARY KEY,
                courier_id TEXT NOT NULL,
                stops TEXT NOT NULL,
                total_distance_km REAL NOT NULL,
                total_duration_minutes REAL NOT NULL,
                total_service_minutes REAL NOT NULL,
                feasibility_score REAL NOT NULL,
                efficiency_ratio REAL NOT NULL,
                planned_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relay_points (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                kind TEXT NOT NULL,
                capacity INTEGER NOT NULL,
                available_slots INTEGER NOT NULL,
                opening_hours TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delivery_plans (
                id TEXT PRIMARY KEY,
                shipment_id TEXT NOT NULL,
                segments TEXT NOT NULL,
                relay_point_ids TEXT NOT NULL,
                total_distance_km REAL NOT NULL,
                total_duration_minutes REAL NOT NULL,
                total_price REAL NOT NULL,
                is_fallback INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                shipment_id TEXT NOT NULL,
                customer_id TEXT NOT NULL,
                merchant_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'CREATED',
                payment_status TEXT NOT NULL DEFAULT 'PENDING',
                assigned_courier TEXT,
                pickup_code TEXT,
                delivery_code TEXT,
                delivery_latitude REAL NOT NULL,
                delivery_longitude REAL NOT NULL,
                delivery_address TEXT NOT NULL,
                amount REAL NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                order_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                from_status TEXT,
                to_status TEXT NOT NULL,
                actor TEXT NOT NULL,
                occurred_at DATETIME NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_tasks (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL,
                task_type TEXT NOT NULL,
                execute_at DATETIME NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                active INTEGER NOT NULL DEFAULT 1,
                completed INTEGER NOT NULL DEFAULT 0,
                result TEXT,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delivery_delays (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                delay_minutes REAL NOT NULL,
                recorded_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delivery_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id TEXT NOT NULL,
                courier_id TEXT NOT NULL,
                completed_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courier_reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                courier_id TEXT NOT NULL,
                rating REAL NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courier_blacklist (
                customer_id TEXT NOT NULL,
                courier_id TEXT NOT NULL,
                PRIMARY KEY (customer_id, courier_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_shipments_status ON shipments(status)",
            "CREATE INDEX IF NOT EXISTS idx_couriers_online ON couriers(is_online)",
            "CREATE INDEX IF NOT EXISTS idx_routes_courier ON routes(courier_id)",
            "CREATE INDEX IF NOT EXISTS idx_relay_points_kind ON relay_points(kind)",
            "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
            "CREATE INDEX IF NOT EXISTS idx_events_order ON workflow_events(order_id)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_due ON scheduled_tasks(active, execute_at)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_order ON scheduled_tasks(order_id)",
            "CREATE INDEX IF NOT EXISTS idx_delays_recorded ON delivery_delays(recorded_at)",
            "CREATE INDEX IF NOT EXISTS idx_history_pair ON delivery_history(customer_id, courier_id)",
            "CREATE INDEX IF NOT EXISTS idx_reviews_courier ON courier_reviews(courier_id)",
        ];
        for sql in indexes {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        debug!("数据库迁移完成");
        Ok(())
    }

    // ---- 仓库工厂 ----

    pub fn shipment_repository(&self) -> SqliteShipmentRepository {
        SqliteShipmentRepository::new(self.pool.clone())
    }

    pub fn courier_repository(&self) -> SqliteCourierRepository {
        SqliteCourierRepository::new(self.pool.clone())
    }

    pub fn route_repository(&self) -> SqliteRouteRepository {
        SqliteRouteRepository::new(self.pool.clone())
    }

    pub fn relay_point_repository(&self) -> SqliteRelayPointRepository {
        SqliteRelayPointRepository::new(self.pool.clone())
    }

    pub fn plan_repository(&self) -> SqlitePlanRepository {
        SqlitePlanRepository::new(self.pool.clone())
    }

    pub fn order_repository(&self) -> SqliteOrderRepository {
        SqliteOrderRepository::new(self.pool.clone())
    }

    pub fn event_repository(&self) -> SqliteEventRepository {
        SqliteEventRepository::new(self.pool.clone())
    }

    pub fn task_repository(&self) -> SqliteTaskRepository {
        SqliteTaskRepository::new(self.pool.clone())
    }

    pub fn stats_repository(&self) -> SqliteStatsRepository {
        SqliteStatsRepository::new(self.pool.clone())
    }

    pub fn history_repository(&self) -> SqliteHistoryRepository {
        SqliteHistoryRepository::new(self.pool.clone())
    }
}
