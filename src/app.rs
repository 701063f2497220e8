use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use courier_dispatcher::{DispatchWorkflow, Notifier, PaymentGateway, TaskScheduler};
use courier_domain::{Actor, DispatchResult};
use courier_geo::{GeoZoneService, PositionCache};
use courier_infrastructure::Database;
use courier_matching::MatchingEngine;
use courier_relay::PartialDeliveryPlanner;
use courier_routing::{GeneticStrategy, RoutePlanner};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;

/// 支付网关占位实现：记录日志并立即返回成功。
/// 真实网关接入后替换，接口已按异步回调模型设计
struct LoggingPaymentGateway;

#[async_trait]
impl PaymentGateway for LoggingPaymentGateway {
    async fn charge(&self, order_id: Uuid, amount: f64) -> DispatchResult<()> {
        info!(%order_id, amount, "发起扣款");
        Ok(())
    }

    async fn refund(&self, order_id: Uuid, amount: f64) -> DispatchResult<()> {
        info!(%order_id, amount, "发起退款");
        Ok(())
    }
}

/// 通知占位实现，同上
struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, recipient: Actor, order_id: Uuid, message: &str) -> DispatchResult<()> {
        info!(recipient = recipient.as_str(), %order_id, message, "下发通知");
        Ok(())
    }
}

/// 主应用：装配各子系统并驱动任务调度循环
pub struct Application {
    database: Database,
    geo: Arc<GeoZoneService>,
    matching: Arc<MatchingEngine>,
    routing: Arc<RoutePlanner>,
    relay: Arc<PartialDeliveryPlanner>,
    workflow: Arc<DispatchWorkflow>,
    scheduler: Arc<TaskScheduler>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        if let Some(parent) = Path::new(&config.database.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("创建数据目录失败: {}", parent.display()))?;
            }
        }
        let database = Database::new_embedded(&config.database.path)
            .await
            .with_context(|| format!("打开数据库失败: {}", config.database.path))?;

        let geo = Arc::new(
            GeoZoneService::new(
                config.geo.clone(),
                config.zones.clone(),
                Arc::new(PositionCache::new()),
                Arc::new(database.stats_repository()),
            )
            .context("初始化区域服务失败")?,
        );

        let matching = Arc::new(
            MatchingEngine::new(
                config.matching.clone(),
                Arc::clone(&geo),
                Arc::new(database.courier_repository()),
                Arc::new(database.route_repository()),
                Arc::new(database.history_repository()),
            )
            .context("初始化匹配引擎失败")?,
        );

        let routing = Arc::new(RoutePlanner::new(
            config.routing.clone(),
            Arc::new(GeneticStrategy::new(config.routing.clone())),
        ));

        let relay = Arc::new(
            PartialDeliveryPlanner::new(
                config.relay.clone(),
                Arc::new(database.relay_point_repository()),
                Arc::new(database.plan_repository()),
                Arc::new(database.courier_repository()),
            )
            .context("初始化分段配送规划器失败")?,
        );

        let workflow = Arc::new(DispatchWorkflow::new(
            config.workflow.clone(),
            Arc::new(database.order_repository()),
            Arc::new(database.event_repository()),
            Arc::new(database.task_repository()),
            Arc::new(LoggingPaymentGateway),
            Arc::new(LoggingNotifier),
        ));

        let scheduler = Arc::new(TaskScheduler::new(
            config.scheduler.clone(),
            Arc::new(database.task_repository()),
            Arc::clone(&workflow),
        ));

        info!("应用装配完成");
        Ok(Self {
            database,
            geo,
            matching,
            routing,
            relay,
            workflow,
            scheduler,
        })
    }

    pub fn geo(&self) -> &Arc<GeoZoneService> {
        &self.geo
    }

    pub fn matching(&self) -> &Arc<MatchingEngine> {
        &self.matching
    }

    pub fn routing(&self) -> &Arc<RoutePlanner> {
        &self.routing
    }

    pub fn relay(&self) -> &Arc<PartialDeliveryPlanner> {
        &self.relay
    }

    pub fn workflow(&self) -> &Arc<DispatchWorkflow> {
        &self.workflow
    }

    /// 运行任务调度循环直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let scheduler = Arc::clone(&self.scheduler);
        tokio::select! {
            _ = scheduler.run() => {}
            _ = shutdown_rx.recv() => {
                info!("调度循环收到关闭信号");
            }
        }
        self.database.close().await;
        Ok(())
    }
}
