use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    orchestrator_observability::{ObservabilityConfig, OrchestratorConfig},
    quality_event_bus::{EventBusConfig, QualityConfig},
    scheduler_collector::{CollectorConfig, SchedulerConfig},
};
use crate::models::{DataType, Location};

/// 配置文件中声明的采集调度，启动时注册
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub name: String,
    pub source: String,
    pub latitude: f64,
    pub longitude: f64,
    pub data_type: DataType,
    pub frequency_minutes: u32,
}

impl ScheduleDefinition {
    pub fn location(&self) -> crate::SchedulerResult<Location> {
        Location::new(self.latitude, self.longitude)
    }
}

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub collector: CollectorConfig,
    pub quality: QualityConfig,
    pub event_bus: EventBusConfig,
    pub orchestrator: OrchestratorConfig,
    pub observability: ObservabilityConfig,
    pub schedules: Vec<ScheduleDefinition>,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: ENERGY_, nested keys separated by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/energy.toml",
                "energy.toml",
                "/etc/energy-scheduler/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ENERGY")
                .prefix_separator("_")
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

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.collector.validate().context("采集器配置验证失败")?;
        self.quality.validate().context("质量评估配置验证失败")?;
        self.event_bus.validate().context("事件总线配置验证失败")?;
        self.orchestrator
            .validate()
            .context("编排器配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        if self.schedules.len() > self.scheduler.max_schedules {
            return Err(anyhow::anyhow!(
                "声明的调度数量 {} 超过上限 {}",
                self.schedules.len(),
                self.scheduler.max_schedules
            ));
        }
        for definition in &self.schedules {
            definition
                .location()
                .with_context(|| format!("调度 {} 的位置无效", definition.name))?;
            if definition.frequency_minutes == 0 {
                return Err(anyhow::anyhow!(
                    "调度 {} 的采集频率必须大于0",
                    definition.name
                ));
            }
        }

        Ok(())
    }
}
