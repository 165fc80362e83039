use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{SchedulerError, SchedulerResult};

/// 采集位置（WGS84坐标）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> SchedulerResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(SchedulerError::invalid_schedule(format!(
                "纬度超出范围 [-90, 90]: {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(SchedulerError::invalid_schedule(format!(
                "经度超出范围 [-180, 180]: {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// 位置键，格式为 `{lat}_{lon}`
    pub fn key(&self) -> String {
        format!("{}_{}", self.latitude, self.longitude)
    }
}

impl FromStr for Location {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once('_')
            .ok_or_else(|| SchedulerError::invalid_schedule(format!("无效的位置键: {s}")))?;
        let latitude = lat
            .trim()
            .parse::<f64>()
            .map_err(|e| SchedulerError::invalid_schedule(format!("无效的纬度 '{lat}': {e}")))?;
        let longitude = lon
            .trim()
            .parse::<f64>()
            .map_err(|e| SchedulerError::invalid_schedule(format!("无效的经度 '{lon}': {e}")))?;
        Location::new(latitude, longitude)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// 采集的数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    CurrentWeather,
    Forecast,
    EnergyLoad,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::CurrentWeather => "current_weather",
            DataType::Forecast => "forecast",
            DataType::EnergyLoad => "energy_load",
        }
    }

    /// 每条记录必须包含的字段（值可以为空）
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            DataType::CurrentWeather | DataType::Forecast => &["timestamp", "temperature"],
            DataType::EnergyLoad => &["timestamp", "demand_kw"],
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current_weather" => Ok(DataType::CurrentWeather),
            "forecast" => Ok(DataType::Forecast),
            "energy_load" => Ok(DataType::EnergyLoad),
            other => Err(SchedulerError::invalid_schedule(format!(
                "不支持的数据类型: {other}"
            ))),
        }
    }
}

/// 最近一次执行的状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// 尚未执行过
    Pending,
    /// 采集正在进行
    Running,
    Succeeded { source_used: String, quality_score: f64 },
    Failed { reason: String },
}

/// 周期性采集任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    pub source: String,
    pub location: Location,
    pub data_type: DataType,
    pub frequency_minutes: u32,
    pub next_run_time: DateTime<Utc>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub last_status: ScheduleStatus,
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        location: Location,
        data_type: DataType,
        frequency_minutes: u32,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Self> {
        let name = name.into();
        let source = source.into();
        if name.trim().is_empty() {
            return Err(SchedulerError::invalid_schedule("调度名称不能为空"));
        }
        if source.trim().is_empty() {
            return Err(SchedulerError::invalid_schedule("数据源不能为空"));
        }
        if frequency_minutes == 0 {
            return Err(SchedulerError::invalid_schedule(format!(
                "调度 {name} 的采集频率必须大于0"
            )));
        }

        Ok(Self {
            name,
            source,
            location,
            data_type,
            frequency_minutes,
            next_run_time: now,
            last_run_time: None,
            enabled: true,
            last_status: ScheduleStatus::Pending,
            consecutive_failures: 0,
            created_at: now,
        })
    }

    pub fn frequency(&self) -> Duration {
        Duration::minutes(i64::from(self.frequency_minutes))
    }

    /// 单次采集的截止时间等于调度周期
    pub fn deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.frequency_minutes) * 60)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_time <= now
    }

    /// 记录一次执行结果，`attempted_at` 为触发该次执行的tick时间
    pub fn record_attempt(&mut self, attempted_at: DateTime<Utc>, status: ScheduleStatus) {
        self.last_run_time = Some(attempted_at);
        self.next_run_time = attempted_at + self.frequency();
        match status {
            ScheduleStatus::Failed { .. } => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            }
            ScheduleStatus::Succeeded { .. } => self.consecutive_failures = 0,
            ScheduleStatus::Pending | ScheduleStatus::Running => {}
        }
        self.last_status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seoul() -> Location {
        Location::new(37.5665, 126.978).unwrap()
    }

    #[test]
    fn test_location_validation() {
        assert!(Location::new(91.0, 0.0).is_err());
        assert!(Location::new(0.0, -180.5).is_err());
        assert!(Location::new(f64::NAN, 0.0).is_err());

        let parsed: Location = "37.5665_126.978".parse().unwrap();
        assert_eq!(parsed, seoul());
        assert_eq!(parsed.key(), "37.5665_126.978");
        assert!("37.5".parse::<Location>().is_err());
    }

    #[test]
    fn test_new_schedule_is_due_immediately() {
        let now = Utc::now();
        let schedule =
            Schedule::new("seoul", "openweather", seoul(), DataType::CurrentWeather, 30, now)
                .unwrap();
        assert!(schedule.is_due(now));
        assert_eq!(schedule.last_status, ScheduleStatus::Pending);
        assert_eq!(schedule.deadline(), std::time::Duration::from_secs(1800));
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let result = Schedule::new("x", "openweather", seoul(), DataType::Forecast, 0, Utc::now());
        assert!(matches!(result, Err(SchedulerError::InvalidSchedule(_))));
    }

    #[test]
    fn test_record_attempt_updates_counters() {
        let now = Utc::now();
        let mut schedule =
            Schedule::new("s", "openweather", seoul(), DataType::Forecast, 10, now).unwrap();

        schedule.record_attempt(
            now,
            ScheduleStatus::Failed {
                reason: "boom".into(),
            },
        );
        assert_eq!(schedule.consecutive_failures, 1);
        assert_eq!(schedule.next_run_time, now + Duration::minutes(10));

        schedule.record_attempt(
            now,
            ScheduleStatus::Succeeded {
                source_used: "openweather".into(),
                quality_score: 0.9,
            },
        );
        assert_eq!(schedule.consecutive_failures, 0);
    }

    #[test]
    fn test_data_type_round_trip() {
        for dt in [DataType::CurrentWeather, DataType::Forecast, DataType::EnergyLoad] {
            assert_eq!(dt.as_str().parse::<DataType>().unwrap(), dt);
        }
        assert!("humidity".parse::<DataType>().is_err());
    }
}
