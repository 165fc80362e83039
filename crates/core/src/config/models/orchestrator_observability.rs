use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{StageConfig, StageKind, WorkflowMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub mode: WorkflowMode,
    /// 并行执行阶段的工作池大小
    pub worker_pool_size: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub retry_jitter_factor: f64,
    /// 阶段名 -> 执行策略
    pub stages: HashMap<String, StageConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: WorkflowMode::Sequential,
            worker_pool_size: StageKind::ALL.len(),
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            retry_jitter_factor: 0.1,
            stages: StageKind::ALL
                .into_iter()
                .map(|stage| (stage.as_str().to_string(), StageConfig::defaults_for(stage)))
                .collect(),
        }
    }
}

impl OrchestratorConfig {
    /// 阶段配置，未配置的阶段使用默认值
    pub fn stage(&self, stage: StageKind) -> StageConfig {
        self.stages
            .get(stage.as_str())
            .cloned()
            .unwrap_or_else(|| StageConfig::defaults_for(stage))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_pool_size == 0 {
            return Err(anyhow::anyhow!("工作池大小必须大于0"));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(anyhow::anyhow!(
                "重试基础间隔 {}ms 大于最大间隔 {}ms",
                self.retry_base_delay_ms,
                self.retry_max_delay_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            return Err(anyhow::anyhow!("重试抖动系数必须位于 [0, 1]"));
        }
        for (name, config) in &self.stages {
            let stage = name
                .parse::<StageKind>()
                .map_err(|e| anyhow::anyhow!("阶段配置无效: {e}"))?;
            config.validate(stage)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_levels
            ));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!("无效的日志格式: {}", self.log_format));
        }
        if self.metrics_enabled
            && self
                .metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(anyhow::anyhow!(
                "无效的指标监听地址: {}",
                self.metrics_bind_address
            ));
        }
        Ok(())
    }
}
