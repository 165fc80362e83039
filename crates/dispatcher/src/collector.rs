use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use energy_core::{
    CollectedBatch, DataType, Location, Reading, SchedulerError, SchedulerResult, SourceFailure,
    SourceRegistry,
};
use energy_infrastructure::{MetricsCollector, StructuredLogger, TimeoutHandler};

/// 多数据源采集器
///
/// 按给定顺序逐个尝试数据源，第一个返回合法批次的数据源胜出。
/// 单次调用内不重试，重试交给调度器的下一次 tick。
pub struct MultiSourceCollector {
    sources: SourceRegistry,
    timeout_handler: TimeoutHandler,
    metrics: Arc<MetricsCollector>,
}

impl MultiSourceCollector {
    pub fn new(
        sources: SourceRegistry,
        timeout_handler: TimeoutHandler,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            sources,
            timeout_handler,
            metrics,
        }
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub async fn collect(
        &self,
        location: &Location,
        data_type: DataType,
        sources: &[String],
    ) -> SchedulerResult<CollectedBatch> {
        let start = Instant::now();
        let mut failures: Vec<SourceFailure> = Vec::new();

        for source_id in sources {
            let Some(source) = self.sources.get(source_id) else {
                StructuredLogger::log_source_fallback(source_id, "数据源未注册");
                failures.push(SourceFailure::new(source_id, "数据源未注册"));
                continue;
            };
            if !source.supports(data_type) {
                let reason = format!("不支持数据类型 {data_type}");
                StructuredLogger::log_source_fallback(source_id, &reason);
                failures.push(SourceFailure::new(source_id, reason));
                continue;
            }

            debug!("尝试数据源 {} 采集 {} @ {}", source_id, data_type, location);
            let fetched = self
                .timeout_handler
                .source_operation(source_id, source.fetch(location, data_type))
                .await
                .and_then(|readings| {
                    check_schema(&readings, data_type)
                        .map(|_| readings)
                        .map_err(|reason| SchedulerError::source_fetch(source_id, reason))
                });

            match fetched {
                Ok(readings) => {
                    info!(
                        "数据源 {} 采集成功: {} 条记录, 之前失败 {} 个数据源, 耗时 {:?}",
                        source_id,
                        readings.len(),
                        failures.len(),
                        start.elapsed()
                    );
                    self.metrics.record_source_fallbacks(failures.len());
                    return Ok(CollectedBatch {
                        source_used: source_id.clone(),
                        readings,
                        failed_sources: failures,
                    });
                }
                Err(e) => {
                    let reason = e.to_string();
                    StructuredLogger::log_source_fallback(source_id, &reason);
                    failures.push(SourceFailure::new(source_id, reason));
                }
            }
        }

        warn!(
            "所有数据源均失败: location={}, data_type={}, 尝试 {} 个",
            location,
            data_type,
            sources.len()
        );
        self.metrics.record_source_fallbacks(failures.len());
        Err(SchedulerError::AllSourcesFailed { failures })
    }
}

/// 批次非空，且每条记录都包含该数据类型的必需字段（值可以为 null）
pub fn check_schema(readings: &[Reading], data_type: DataType) -> Result<(), String> {
    if readings.is_empty() {
        return Err("返回的批次为空".to_string());
    }
    for (idx, reading) in readings.iter().enumerate() {
        if let Some(field) = data_type
            .required_fields()
            .iter()
            .find(|field| !reading.contains_field(field))
        {
            return Err(format!("第 {idx} 条记录缺少必需字段 '{field}'"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_check() {
        let ok = vec![Reading::new()
            .with("timestamp", "2024-01-01T00:00:00Z")
            .with("temperature", serde_json::Value::Null)];
        assert!(check_schema(&ok, DataType::CurrentWeather).is_ok());
        assert!(check_schema(&ok, DataType::EnergyLoad).is_err());
        assert!(check_schema(&[], DataType::Forecast).is_err());
    }
}
