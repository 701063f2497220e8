use async_trait::async_trait;
use courier_domain::{
    Actor, DispatchError, DispatchResult, OrderStatus, WorkflowEvent, WorkflowEventRepository,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> DispatchResult<WorkflowEvent> {
        let id: String = row.try_get("id")?;
        let order_id: String = row.try_get("order_id")?;
        let actor: String = row.try_get("actor")?;
        let metadata: String = row.try_get("metadata")?;

        Ok(WorkflowEvent {
            id: parse_uuid(&id)?,
            order_id: parse_uuid(&order_id)?,
            event_type: row.try_get("event_type")?,
            from_status: row.try_get::<Option<OrderStatus>, _>("from_status")?,
            to_status: row.try_get::<OrderStatus, _>("to_status")?,
            actor: Actor::parse_str(&actor)
                .ok_or_else(|| DispatchError::Serialization(format!("非法参与者: {actor}")))?,
            occurred_at: row.try_get("occurred_at")?,
            metadata: serde_json::from_str(&metadata)?,
        })
    }
}

#[async_trait]
impl WorkflowEventRepository for SqliteEventRepository {
    async fn append(&self, event: &WorkflowEvent) -> DispatchResult<()> {
        let metadata = serde_json::to_string(&event.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO workflow_events (
                id, order_id, event_type, from_status, to_status,
                actor, occurred_at, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.order_id.to_string())
        .bind(&event.event_type)
        .bind(event.from_status)
        .bind(event.to_status)
        .bind(event.actor.as_str())
        .bind(event.occurred_at)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_order(&self, order_id: Uuid) -> DispatchResult<Vec<WorkflowEvent>> {
        // 以自增 seq 排序，同一毫秒内的事件也保持追加顺序
        let rows = sqlx::query("SELECT * FROM workflow_events WHERE order_id = ? ORDER BY seq")
            .bind(order_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn latest_for_order(&self, order_id: Uuid) -> DispatchResult<Option<WorkflowEvent>> {
        let row = sqlx::query(
            "SELECT * FROM workflow_events WHERE order_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(order_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_event(&r)).transpose()
    }
}
