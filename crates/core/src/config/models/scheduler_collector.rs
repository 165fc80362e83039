use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::DataType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_interval_seconds: u64,
    pub max_concurrent_collections: usize,
    /// 连续失败达到该次数后，采集事件提升为高优先级
    pub failure_escalation_threshold: u32,
    pub max_schedules: usize,
    /// 低于该质量分数的采集会额外发出告警
    pub min_quality_score: f64,
    pub shutdown_grace_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_seconds: 10,
            max_concurrent_collections: 5,
            failure_escalation_threshold: 3,
            max_schedules: 50,
            min_quality_score: 0.7,
            shutdown_grace_seconds: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }
        if self.max_concurrent_collections == 0 {
            return Err(anyhow::anyhow!("最大并发采集数必须大于0"));
        }
        if self.failure_escalation_threshold == 0 {
            return Err(anyhow::anyhow!("失败升级阈值必须大于0"));
        }
        if self.max_schedules == 0 {
            return Err(anyhow::anyhow!("最大调度数必须大于0"));
        }
        if !(0.0..=1.0).contains(&self.min_quality_score) {
            return Err(anyhow::anyhow!(
                "最低质量分数必须位于 [0, 1]: {}",
                self.min_quality_score
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub source_timeout_seconds: u64,
    /// 数据类型 -> 按优先级排列的数据源
    pub default_sources: HashMap<String, Vec<String>>,
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        let weather_sources = vec![
            "openweather".to_string(),
            "weatherapi".to_string(),
            "accuweather".to_string(),
            "noaa".to_string(),
        ];
        let mut default_sources = HashMap::new();
        default_sources.insert(
            DataType::CurrentWeather.as_str().to_string(),
            weather_sources.clone(),
        );
        default_sources.insert(DataType::Forecast.as_str().to_string(), weather_sources);

        Self {
            source_timeout_seconds: 10,
            default_sources,
            openweather_api_key: None,
            openweather_base_url: "https://api.openweathermap.org/data/2.5".to_string(),
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("数据源超时时间必须大于0"));
        }
        for (data_type, sources) in &self.default_sources {
            data_type
                .parse::<DataType>()
                .map_err(|e| anyhow::anyhow!("默认数据源配置无效: {e}"))?;
            if sources.iter().any(|s| s.trim().is_empty()) {
                return Err(anyhow::anyhow!("数据类型 {data_type} 的数据源列表包含空值"));
            }
        }
        if self.openweather_base_url.is_empty() {
            return Err(anyhow::anyhow!("OpenWeather地址不能为空"));
        }
        Ok(())
    }

    /// 调度的数据源链：调度自身的数据源优先，然后是该数据类型的默认顺序
    pub fn source_chain(&self, primary: &str, data_type: DataType) -> Vec<String> {
        let mut chain = vec![primary.to_string()];
        if let Some(defaults) = self.default_sources.get(data_type.as_str()) {
            for source in defaults {
                if !chain.contains(source) {
                    chain.push(source.clone());
                }
            }
        }
        chain
    }
}
