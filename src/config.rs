//! 应用配置
//!
//! 加载顺序：TOML 文件（可选）→ COURIER__ 前缀环境变量，
//! 缺省值来自各子系统配置的 Default 实现

use std::path::Path;

use anyhow::{Context, Result};
use ::config::{Config, Environment, File, FileFormat};
use courier_domain::GeoZone;
use courier_dispatcher::{SchedulerConfig, WorkflowConfig};
use courier_geo::GeoConfig;
use courier_matching::MatchingConfig;
use courier_relay::RelayConfig;
use courier_routing::RoutingConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 嵌入式 SQLite 数据库文件路径
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/courier.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub geo: GeoConfig,
    pub matching: MatchingConfig,
    pub routing: RoutingConfig,
    pub relay: RelayConfig,
    pub workflow: WorkflowConfig,
    pub scheduler: SchedulerConfig,
    /// 配送区域目录，由运营方在配置文件中维护
    pub zones: Vec<GeoZone>,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                anyhow::bail!("配置文件不存在: {path}");
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("COURIER")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.path.is_empty() {
            anyhow::bail!("数据库路径不能为空");
        }
        self.matching.validate().context("匹配配置非法")?;
        self.relay.validate().context("分段配送配置非法")?;
        for zone in &self.zones {
            zone.validate()
                .with_context(|| format!("区域定义非法: {}", zone.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database.path, "data/courier.db");
        assert_eq!(config.scheduler.sweep_interval_seconds, 60);
        assert_eq!(config.workflow.payment_timeout_minutes, 30);
        assert!(config.zones.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_overrides_selected_fields() {
        let config = AppConfig::from_toml(
            r#"
            [database]
            path = "/tmp/dispatch.db"

            [scheduler]
            batch_size = 10

            [relay]
            trigger_distance_km = 80.0
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, "/tmp/dispatch.db");
        assert_eq!(config.scheduler.batch_size, 10);
        assert_eq!(config.relay.trigger_distance_km, 80.0);
        // 未覆盖的字段保持缺省
        assert_eq!(config.scheduler.sweep_interval_seconds, 60);
        assert_eq!(config.relay.max_leg_km, 50.0);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(AppConfig::from_toml("[database]\npath = \"\"").is_err());
    }
}
