//! 配置管理
//!
//! 配置在进程启动时加载一次，之后只读：
//! 默认值 -> TOML 配置文件 -> `ENERGY_` 前缀的环境变量。

pub mod models;

pub use models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StageKind, WorkflowMode};
    use std::io::Write;

    const SAMPLE: &str = r#"
[scheduler]
tick_interval_seconds = 5
failure_escalation_threshold = 4

[event_bus]
capacity = 16
overflow_policy = "drop_oldest_low_priority"

[orchestrator]
mode = "parallel"
worker_pool_size = 3

[orchestrator.stages.forecasting]
max_iterations = 2
timeout_seconds = 30
retry_attempts = 1
endpoint = "http://localhost:8000/api/model-testing"

[[schedules]]
name = "seoul-current"
source = "openweather"
latitude = 37.5665
longitude = 126.978
data_type = "current_weather"
frequency_minutes = 15
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.event_bus.capacity, 1000);
        assert_eq!(config.event_bus.overflow_policy, OverflowPolicy::Reject);
        assert_eq!(config.orchestrator.worker_pool_size, 5);
        assert_eq!(config.orchestrator.stage(StageKind::DemandControl).timeout_seconds, 400);
    }

    #[test]
    fn test_from_toml_overrides_and_keeps_defaults() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.scheduler.tick_interval_seconds, 5);
        assert_eq!(config.scheduler.max_concurrent_collections, 5);
        assert_eq!(config.event_bus.capacity, 16);
        assert_eq!(
            config.event_bus.overflow_policy,
            OverflowPolicy::DropOldestLowPriority
        );
        assert_eq!(config.orchestrator.mode, WorkflowMode::Parallel);

        let forecasting = config.orchestrator.stage(StageKind::Forecasting);
        assert_eq!(forecasting.max_iterations, 2);
        assert!(forecasting.endpoint.is_some());
        // 未配置的阶段回退到默认值
        assert_eq!(config.orchestrator.stage(StageKind::Reporting).retry_attempts, 2);

        assert_eq!(config.schedules.len(), 1);
        assert_eq!(config.schedules[0].frequency_minutes, 15);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.event_bus.capacity, 16);
        assert_eq!(config.schedules[0].name, "seoul-current");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load(Some("/nonexistent/energy.toml")).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_stage = r#"
[orchestrator.stages.crew]
max_iterations = 1
timeout_seconds = 1
retry_attempts = 0
"#;
        assert!(AppConfig::from_toml(bad_stage).is_err());

        let bad_weights = r#"
[quality]
missing_weight = 0.0
duplicate_weight = 0.0
outlier_weight = 0.0
"#;
        assert!(AppConfig::from_toml(bad_weights).is_err());

        let bad_schedule = r#"
[[schedules]]
name = "x"
source = "openweather"
latitude = 120.0
longitude = 0.0
data_type = "forecast"
frequency_minutes = 5
"#;
        assert!(AppConfig::from_toml(bad_schedule).is_err());
    }

    #[test]
    fn test_source_chain_deduplicates() {
        let config = CollectorConfig::default();
        let chain = config.source_chain("weatherapi", crate::models::DataType::CurrentWeather);
        assert_eq!(chain, vec!["weatherapi", "openweather", "accuweather", "noaa"]);
        let chain = config.source_chain("grid", crate::models::DataType::EnergyLoad);
        assert_eq!(chain, vec!["grid"]);
    }
}
