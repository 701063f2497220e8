use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_domain::{
    DispatchError, DispatchResult, ScheduledTask, ScheduledTaskRepository, TaskType,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> DispatchResult<ScheduledTask> {
        let id: String = row.try_get("id")?;
        let order_id: String = row.try_get("order_id")?;
        let retry_count: i64 = row.try_get("retry_count")?;
        let max_retries: i64 = row.try_get("max_retries")?;

        Ok(ScheduledTask {
            id: parse_uuid(&id)?,
            order_id: parse_uuid(&order_id)?,
            task_type: row.try_get::<TaskType, _>("task_type")?,
            execute_at: row.try_get("execute_at")?,
            retry_count: retry_count as u32,
            max_retries: max_retries as u32,
            active: row.try_get("active")?,
            completed: row.try_get("completed")?,
            result: row.try_get("result")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl ScheduledTaskRepository for SqliteTaskRepository {
    async fn save(&self, task: &ScheduledTask) -> DispatchResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_tasks (
                id, order_id, task_type, execute_at, retry_count,
                max_retries, active, completed, result, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.order_id.to_string())
        .bind(task.task_type)
        .bind(task.execute_at)
        .bind(task.retry_count as i64)
        .bind(task.max_retries as i64)
        .bind(task.active)
        .bind(task.completed)
        .bind(task.result.as_deref())
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<ScheduledTask>> {
        let row = sqlx::query("SELECT * FROM scheduled_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_task(&r)).transpose()
    }

    async fn claim_due_batch(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DispatchResult<Vec<ScheduledTask>> {
        // 单条语句完成认领：置 active = 0 并返回被认领的行，
        // 并发扫描者对同一行最多有一方成功
        let rows = sqlx::query(
            r#"
            UPDATE scheduled_tasks SET active = 0
            WHERE id IN (
                SELECT id FROM scheduled_tasks
                WHERE active = 1 AND completed = 0 AND execute_at <= ?1
                ORDER BY execute_at
                LIMIT ?2
            )
            RETURNING id, order_id, task_type, execute_at, retry_count,
                      max_retries, active, completed, result, created_at
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        // RETURNING 按物理行序返回，不保留子查询的排序
        let mut tasks = rows
            .iter()
            .map(Self::row_to_task)
            .collect::<DispatchResult<Vec<_>>>()?;
        tasks.sort_by_key(|t| t.execute_at);
        Ok(tasks)
    }

    async fn reschedule(
        &self,
        task_id: Uuid,
        execute_at: DateTime<Utc>,
        retry_count: u32,
    ) -> DispatchResult<()> {
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET active = 1, execute_at = ?, retry_count = ? WHERE id = ?",
        )
        .bind(execute_at)
        .bind(retry_count as i64)
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::internal(format!(
                "重排不存在的任务: {task_id}"
            )));
        }
        Ok(())
    }

    async fn mark_completed(&self, task_id: Uuid, result: &str) -> DispatchResult<()> {
        sqlx::query(
            "UPDATE scheduled_tasks SET active = 0, completed = 1, result = ? WHERE id = ?",
        )
        .bind(result)
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed_permanent(&self, task_id: Uuid, result: &str) -> DispatchResult<()> {
        sqlx::query(
            "UPDATE scheduled_tasks SET active = 0, completed = 1, result = ? WHERE id = ?",
        )
        .bind(result)
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active(
        &self,
        order_id: Uuid,
        task_type: TaskType,
    ) -> DispatchResult<Option<ScheduledTask>> {
        let row = sqlx::query(
            "SELECT * FROM scheduled_tasks \
             WHERE order_id = ? AND task_type = ? AND active = 1 AND completed = 0 \
             LIMIT 1",
        )
        .bind(order_id.to_string())
        .bind(task_type)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_task(&r)).transpose()
    }

    async fn cancel_for_order(&self, order_id: Uuid) -> DispatchResult<u32> {
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET active = 0, result = '已取消' \
             WHERE order_id = ? AND active = 1 AND completed = 0",
        )
        .bind(order_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as u32)
    }

    async fn cancel_by_type(&self, order_id: Uuid, task_type: TaskType) -> DispatchResult<u32> {
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET active = 0, result = '已取消' \
             WHERE order_id = ? AND task_type = ? AND active = 1 AND completed = 0",
        )
        .bind(order_id.to_string())
        .bind(task_type)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as u32)
    }
}
