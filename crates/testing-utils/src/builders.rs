//! Test data builders for creating readings and configuration
//!
//! Builders use sensible defaults so a test only spells out the fields it
//! cares about.

use chrono::{DateTime, Duration, TimeZone, Utc};
use energy_core::config::{AppConfig, OrchestratorConfig};
use energy_core::{
    CollectionResult, DataType, Location, Reading, StageConfig, StageKind, WorkflowMode,
};
use serde_json::Value;

/// Builder for weather readings
pub struct ReadingBuilder {
    reading: Reading,
}

impl ReadingBuilder {
    pub fn new() -> Self {
        Self {
            reading: Reading::new()
                .with("timestamp", base_time().to_rfc3339())
                .with("temperature", 20.0)
                .with("humidity", 50.0),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.reading.insert("timestamp", timestamp.to_rfc3339());
        self
    }

    pub fn temperature(mut self, value: Option<f64>) -> Self {
        self.reading
            .insert("temperature", value.map(Value::from).unwrap_or(Value::Null));
        self
    }

    pub fn humidity(mut self, value: f64) -> Self {
        self.reading.insert("humidity", value);
        self
    }

    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.reading.insert(name, value);
        self
    }

    pub fn build(self) -> Reading {
        self.reading
    }
}

impl Default for ReadingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// `count` clean hourly readings with gently varying values
pub fn sample_weather_batch(count: usize) -> Vec<Reading> {
    (0..count)
        .map(|i| {
            ReadingBuilder::new()
                .at(base_time() + Duration::hours(i as i64))
                .temperature(Some(15.0 + (i % 10) as f64 * 0.5))
                .humidity(40.0 + (i % 20) as f64)
                .build()
        })
        .collect()
}

/// 100 readings: 10 with a null temperature and one exact duplicate row
pub fn batch_with_nulls_and_duplicate() -> Vec<Reading> {
    let mut readings = sample_weather_batch(100);
    for idx in (0..100).step_by(10) {
        readings[idx].insert("temperature", Value::Null);
    }
    readings[99] = readings[98].clone();
    readings
}

pub fn seoul() -> Location {
    Location {
        latitude: 37.5665,
        longitude: 126.978,
    }
}

/// Orchestrator config with every stage set to the given policy
pub fn orchestrator_config(mode: WorkflowMode, stage: StageConfig) -> OrchestratorConfig {
    let mut config = OrchestratorConfig {
        mode,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 100,
        retry_jitter_factor: 0.0,
        ..OrchestratorConfig::default()
    };
    for kind in StageKind::ALL {
        config.stages.insert(kind.as_str().to_string(), stage.clone());
    }
    config
}

/// Default app config with a short tick suited to tests
pub fn test_app_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scheduler.tick_interval_seconds = 1;
    config.collector.source_timeout_seconds = 2;
    config
}

/// A successful collection result for `schedule_name` over a clean batch
pub fn sample_collection(schedule_name: &str) -> CollectionResult {
    CollectionResult {
        schedule_name: schedule_name.to_string(),
        timestamp: base_time(),
        location: seoul(),
        data_type: DataType::CurrentWeather,
        source_used: "openweather".to_string(),
        readings: sample_weather_batch(24),
        quality_score: 1.0,
        anomaly_count: 0,
        duplicate_count: 0,
        missing_fraction: 0.0,
    }
}
