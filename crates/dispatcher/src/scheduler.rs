//! 持久化延迟任务执行器
//!
//! 周期扫描到期任务，原子认领一个有界批次后逐个执行。
//! 至少一次语义：处理器自身幂等是防止重复执行的唯一保障

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use courier_domain::{DispatchError, DispatchResult, ScheduledTask, ScheduledTaskRepository, TaskType};
use tracing::{debug, error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::workflow::DispatchWorkflow;

pub struct TaskScheduler {
    config: SchedulerConfig,
    tasks: Arc<dyn ScheduledTaskRepository>,
    workflow: Arc<DispatchWorkflow>,
}

impl TaskScheduler {
    pub fn new(
        config: SchedulerConfig,
        tasks: Arc<dyn ScheduledTaskRepository>,
        workflow: Arc<DispatchWorkflow>,
    ) -> Self {
        Self {
            config,
            tasks,
            workflow,
        }
    }

    /// 主循环，随进程存活；外层用 select 配合停机信号
    pub async fn run(&self) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.sweep_interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_seconds = self.config.sweep_interval_seconds,
            batch_size = self.config.batch_size,
            "任务调度器已启动"
        );
        loop {
            interval.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(count) => debug!(count, "本轮任务处理完成"),
                Err(err) => error!(error = %err, "任务扫描失败，等待下一轮"),
            }
        }
    }

    /// 单轮扫描：认领即下线，避免多实例重复处理
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> DispatchResult<usize> {
        let now = Utc::now();
        let batch = self.tasks.claim_due_batch(now, self.config.batch_size).await?;
        for task in &batch {
            self.execute(task, now).await;
        }
        Ok(batch.len())
    }

    async fn execute(&self, task: &ScheduledTask, now: DateTime<Utc>) {
        match self.dispatch(task).await {
            Ok(result) => {
                debug!(
                    task_id = %task.id,
                    order_id = %task.order_id,
                    task_type = task.task_type.as_str(),
                    result,
                    "任务执行完成"
                );
                if let Err(err) = self.tasks.mark_completed(task.id, &result).await {
                    error!(task_id = %task.id, error = %err, "任务完成状态写入失败");
                }
            }
            Err(err) if err.is_retryable() && !task.retries_exhausted() => {
                let next = now + Duration::minutes(self.config.retry_delay_minutes);
                warn!(
                    task_id = %task.id,
                    order_id = %task.order_id,
                    retry_count = task.retry_count + 1,
                    error = %err,
                    "任务执行失败，已重新排期"
                );
                if let Err(err) = self
                    .tasks
                    .reschedule(task.id, next, task.retry_count + 1)
                    .await
                {
                    error!(task_id = %task.id, error = %err, "任务重排失败");
                }
            }
            Err(err) => {
                let exhausted = DispatchError::TimeoutExhausted {
                    order_id: task.order_id,
                    task_type: task.task_type.as_str().to_string(),
                };
                error!(
                    task_id = %task.id,
                    order_id = %task.order_id,
                    task_type = task.task_type.as_str(),
                    error = %err,
                    "{exhausted}，需人工介入"
                );
                if let Err(err) = self
                    .tasks
                    .mark_failed_permanent(task.id, &err.to_string())
                    .await
                {
                    error!(task_id = %task.id, error = %err, "任务终态写入失败");
                }
            }
        }
    }

    async fn dispatch(&self, task: &ScheduledTask) -> DispatchResult<String> {
        match task.task_type {
            TaskType::PaymentTimeout => self.workflow.handle_payment_timeout(task.order_id).await,
            TaskType::PreparationTimeout => {
                self.workflow.handle_preparation_timeout(task.order_id).await
            }
            TaskType::PickupTimeout => self.workflow.handle_pickup_timeout(task.order_id).await,
            TaskType::DeliveryTimeout => self.workflow.handle_delivery_timeout(task.order_id).await,
            TaskType::ReturnToMerchant => {
                self.workflow.handle_return_to_merchant(task.order_id).await
            }
            TaskType::RefundRetry => self.workflow.handle_refund_retry(task.order_id).await,
        }
    }
}
