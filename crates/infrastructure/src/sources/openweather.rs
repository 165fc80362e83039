//! OpenWeatherMap 数据源适配器
//!
//! 支持 `current_weather`（`/weather`）和 `forecast`（`/forecast`），
//! 将响应规范化为 `timestamp / temperature / humidity / pressure / wind_speed` 记录。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use energy_core::{DataSource, DataType, Location, Reading, SchedulerError, SchedulerResult};

pub const SOURCE_ID: &str = "openweather";

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WeatherEntry {
    dt: i64,
    main: Option<MainBlock>,
    wind: Option<WindBlock>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<WeatherEntry>,
}

fn optional(value: Option<f64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn to_reading(entry: &WeatherEntry) -> Reading {
    let timestamp = DateTime::<Utc>::from_timestamp(entry.dt, 0)
        .map(|t| Value::from(t.to_rfc3339()))
        .unwrap_or(Value::Null);
    let main = entry.main.as_ref();
    Reading::new()
        .with("timestamp", timestamp)
        .with("temperature", optional(main.and_then(|m| m.temp)))
        .with("humidity", optional(main.and_then(|m| m.humidity)))
        .with("pressure", optional(main.and_then(|m| m.pressure)))
        .with(
            "wind_speed",
            optional(entry.wind.as_ref().and_then(|w| w.speed)),
        )
}

/// 解析 `/weather` 响应
pub fn parse_current(body: &str) -> SchedulerResult<Vec<Reading>> {
    let entry: WeatherEntry = serde_json::from_str(body).map_err(|e| {
        SchedulerError::source_fetch(SOURCE_ID, format!("解析当前天气响应失败: {e}"))
    })?;
    Ok(vec![to_reading(&entry)])
}

/// 解析 `/forecast` 响应
pub fn parse_forecast(body: &str) -> SchedulerResult<Vec<Reading>> {
    let response: ForecastResponse = serde_json::from_str(body).map_err(|e| {
        SchedulerError::source_fetch(SOURCE_ID, format!("解析天气预报响应失败: {e}"))
    })?;
    Ok(response.list.iter().map(to_reading).collect())
}

pub struct OpenWeatherSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherSource {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(data_type: DataType) -> Option<&'static str> {
        match data_type {
            DataType::CurrentWeather => Some("weather"),
            DataType::Forecast => Some("forecast"),
            DataType::EnergyLoad => None,
        }
    }
}

#[async_trait]
impl DataSource for OpenWeatherSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn supports(&self, data_type: DataType) -> bool {
        Self::endpoint(data_type).is_some()
    }

    async fn fetch(
        &self,
        location: &Location,
        data_type: DataType,
    ) -> SchedulerResult<Vec<Reading>> {
        let path = Self::endpoint(data_type).ok_or_else(|| {
            SchedulerError::source_fetch(SOURCE_ID, format!("不支持的数据类型: {data_type}"))
        })?;
        let url = format!("{}/{}", self.base_url, path);
        debug!("请求OpenWeather: url={}, location={}", url, location);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", location.latitude.to_string()),
                ("lon", location.longitude.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SchedulerError::source_fetch(SOURCE_ID, format!("HTTP请求失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchedulerError::source_fetch(
                SOURCE_ID,
                format!("HTTP请求失败，状态码: {}", status.as_u16()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SchedulerError::source_fetch(SOURCE_ID, format!("读取响应体失败: {e}")))?;

        let readings = match data_type {
            DataType::Forecast => parse_forecast(&body)?,
            _ => parse_current(&body)?,
        };
        info!(
            "OpenWeather返回 {} 条记录: location={}, data_type={}",
            readings.len(),
            location,
            data_type
        );
        Ok(readings)
    }
}
