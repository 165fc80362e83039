//! 阶段处理器实现
//!
//! 配置了 `endpoint` 的阶段通过 HTTP 调用外部分析模块，
//! 其余阶段使用内置的汇总处理器。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use energy_core::config::OrchestratorConfig;
use energy_core::{
    EventPriority, ProcessorRegistry, SchedulerError, SchedulerResult, StageContext, StageKind,
    StageOutput, StageProcessor,
};

/// 内置处理器：汇总输入上下文，不做分析
#[derive(Debug, Clone, Default)]
pub struct PassthroughProcessor;

impl PassthroughProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageProcessor for PassthroughProcessor {
    async fn run(&self, context: &StageContext) -> SchedulerResult<StageOutput> {
        let Some(collection) = &context.collection else {
            return Ok(StageOutput::new(format!("{}: 无采集数据", context.stage)));
        };

        let data = json!({
            "schedule": collection.schedule_name,
            "source": collection.source_used,
            "records": collection.readings.len(),
            "quality_score": collection.quality_score,
            "anomaly_count": collection.anomaly_count,
            "upstream": context.upstream.keys().map(|s| s.as_str()).collect::<Vec<_>>(),
        });
        let output = StageOutput::new(format!(
            "{}: {} 条记录, 质量 {:.3}",
            context.stage,
            collection.readings.len(),
            collection.quality_score
        ))
        .with_data(data);

        // 检测到离群值时提升异常事件的优先级
        if context.stage == StageKind::Anomaly && collection.anomaly_count > 0 {
            return Ok(output.escalated(EventPriority::High));
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// 通过 HTTP POST 调用外部分析模块
///
/// 请求体为 JSON 格式的 `StageContext`，响应体解码为 `StageOutput`。
/// 超时由阶段执行器统一控制。
pub struct HttpStageProcessor {
    stage: StageKind,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpStageProcessor {
    pub fn new(stage: StageKind, endpoint: impl Into<String>) -> Self {
        Self {
            stage,
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StageProcessor for HttpStageProcessor {
    async fn run(&self, context: &StageContext) -> SchedulerResult<StageOutput> {
        debug!(
            "调用外部处理器: stage={}, url={}, attempt={}, iteration={}",
            self.stage, self.endpoint, context.attempt, context.iteration
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(context)
            .send()
            .await
            .map_err(|e| {
                SchedulerError::stage_execution(self.stage, format!("HTTP请求失败: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SchedulerError::stage_execution(
                self.stage,
                format!("HTTP请求失败，状态码: {}, 响应: {}", status.as_u16(), body),
            ));
        }

        response.json::<StageOutput>().await.map_err(|e| {
            SchedulerError::stage_execution(self.stage, format!("解析处理器响应失败: {e}"))
        })
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}

/// 按配置为每个阶段注册处理器
pub fn build_processor_registry(config: &OrchestratorConfig) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    for stage in StageKind::ALL {
        let processor: Arc<dyn StageProcessor> = match config.stage(stage).endpoint {
            Some(endpoint) => {
                info!("阶段 {} 使用外部处理器: {}", stage, endpoint);
                Arc::new(HttpStageProcessor::new(stage, endpoint))
            }
            None => Arc::new(PassthroughProcessor::new()),
        };
        registry.register(stage, processor);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_core::StageConfig;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_passthrough_without_collection() {
        let context = StageContext::new(Uuid::new_v4(), StageKind::Reporting, None);
        let output = PassthroughProcessor::new().run(&context).await.unwrap();
        assert!(!output.needs_refinement);
        assert!(output.summary.starts_with("reporting"));
    }

    #[test]
    fn test_registry_uses_http_for_configured_endpoint() {
        let mut config = OrchestratorConfig::default();
        let mut forecasting = StageConfig::defaults_for(StageKind::Forecasting);
        forecasting.endpoint = Some("http://localhost:9000/forecast".to_string());
        config
            .stages
            .insert(StageKind::Forecasting.as_str().to_string(), forecasting);

        let registry = build_processor_registry(&config);
        assert!(registry.missing_stages().is_empty());
        assert_eq!(
            registry.get(StageKind::Forecasting).unwrap().name(),
            "http://localhost:9000/forecast"
        );
        assert_eq!(registry.get(StageKind::Anomaly).unwrap().name(), "passthrough");
    }
}
