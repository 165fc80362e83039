use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CollectionResult, EventPriority};
use crate::SchedulerError;

/// 处理阶段，顺序即顺序工作流的声明顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    DataIngestion,
    Forecasting,
    Anomaly,
    DemandControl,
    Reporting,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::DataIngestion,
        StageKind::Forecasting,
        StageKind::Anomaly,
        StageKind::DemandControl,
        StageKind::Reporting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::DataIngestion => "data_ingestion",
            StageKind::Forecasting => "forecasting",
            StageKind::Anomaly => "anomaly",
            StageKind::DemandControl => "demand_control",
            StageKind::Reporting => "reporting",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| SchedulerError::config_error(format!("未知的处理阶段: {s}")))
    }
}

/// 单个阶段的执行策略，启动时加载后只读
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// 单次调用内的最大细化迭代次数
    pub max_iterations: u32,
    /// 每次尝试的超时时间，覆盖该次尝试的全部迭代
    pub timeout_seconds: u64,
    /// 首次尝试失败后的完整重试次数
    pub retry_attempts: u32,
    /// 外部分析模块地址，为空时使用内置处理器
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl StageConfig {
    pub fn new(max_iterations: u32, timeout_seconds: u64, retry_attempts: u32) -> Self {
        Self {
            max_iterations,
            timeout_seconds,
            retry_attempts,
            endpoint: None,
        }
    }

    pub fn defaults_for(stage: StageKind) -> Self {
        match stage {
            StageKind::DataIngestion => Self::new(3, 300, 2),
            StageKind::Forecasting => Self::new(5, 600, 3),
            StageKind::Anomaly => Self::new(3, 300, 2),
            StageKind::DemandControl => Self::new(4, 400, 2),
            StageKind::Reporting => Self::new(3, 300, 2),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// 总尝试次数 = 首次 + 重试
    pub fn total_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }

    pub fn validate(&self, stage: StageKind) -> anyhow::Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow::anyhow!("阶段 {stage} 的最大迭代次数必须大于0"));
        }
        if self.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("阶段 {stage} 的超时时间必须大于0"));
        }
        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(anyhow::anyhow!("阶段 {stage} 的处理器地址无效: {endpoint}"));
            }
        }
        Ok(())
    }
}

/// 工作流执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    Sequential,
    Parallel,
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowMode::Sequential => f.write_str("sequential"),
            WorkflowMode::Parallel => f.write_str("parallel"),
        }
    }
}

/// 阶段处理器的输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub summary: String,
    #[serde(default)]
    pub data: serde_json::Value,
    /// 处理器请求在同一次尝试内继续细化
    #[serde(default)]
    pub needs_refinement: bool,
    /// 处理器建议的事件优先级，用于提升后续事件
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<EventPriority>,
}

impl StageOutput {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            data: serde_json::Value::Null,
            needs_refinement: false,
            escalate_to: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn refining(mut self) -> Self {
        self.needs_refinement = true;
        self
    }

    pub fn escalated(mut self, priority: EventPriority) -> Self {
        self.escalate_to = Some(priority);
        self
    }
}

/// 阶段调用的输入上下文
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageContext {
    pub run_id: Uuid,
    pub stage: StageKind,
    /// 从1开始
    pub attempt: u32,
    /// 从1开始
    pub iteration: u32,
    /// 触发本次运行的采集结果（运行开始时的快照）
    pub collection: Option<CollectionResult>,
    /// 上游阶段的输出，仅顺序模式下填充
    pub upstream: BTreeMap<StageKind, StageOutput>,
    /// 同一次尝试内上一轮迭代的输出
    pub previous: Option<StageOutput>,
}

impl StageContext {
    pub fn new(run_id: Uuid, stage: StageKind, collection: Option<CollectionResult>) -> Self {
        Self {
            run_id,
            stage,
            attempt: 1,
            iteration: 1,
            collection,
            upstream: BTreeMap::new(),
            previous: None,
        }
    }
}

/// 阶段用尽重试后的失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: StageKind,
    pub attempts: u32,
    pub last_error: String,
}

impl From<StageError> for SchedulerError {
    fn from(err: StageError) -> Self {
        SchedulerError::StageExhausted {
            stage: err.stage,
            attempts: err.attempts,
            last_error: err.last_error,
        }
    }
}

/// 阶段执行记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub outcome: Result<StageOutput, StageError>,
    pub attempts: u32,
    pub iterations: u32,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl StageRecord {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// 工作流运行状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// 顺序模式下在该阶段中止
    Failed { stage: StageKind },
    /// 并行模式下部分阶段失败
    PartiallyFailed { failed: Vec<StageKind> },
}

/// 一次编排运行的临时记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    pub mode: WorkflowMode,
    pub trigger: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<StageRecord>,
    pub status: RunStatus,
}

impl WorkflowRun {
    pub fn record(&self, stage: StageKind) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.stage == stage)
    }

    pub fn executed_stages(&self) -> Vec<StageKind> {
        self.records.iter().map(|r| r.stage).collect()
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_declared_order() {
        let mut shuffled = vec![
            StageKind::Reporting,
            StageKind::DataIngestion,
            StageKind::DemandControl,
            StageKind::Forecasting,
            StageKind::Anomaly,
        ];
        shuffled.sort();
        assert_eq!(shuffled, StageKind::ALL.to_vec());
    }

    #[test]
    fn test_stage_defaults() {
        let cfg = StageConfig::defaults_for(StageKind::Forecasting);
        assert_eq!(cfg.max_iterations, 5);
        assert_eq!(cfg.timeout_seconds, 600);
        assert_eq!(cfg.total_attempts(), 4);
        assert!(cfg.validate(StageKind::Forecasting).is_ok());

        let mut bad = cfg.clone();
        bad.endpoint = Some("ftp://x".into());
        assert!(bad.validate(StageKind::Forecasting).is_err());
    }

    #[test]
    fn test_stage_name_parsing() {
        assert_eq!("demand_control".parse::<StageKind>().unwrap(), StageKind::DemandControl);
        assert!("crew".parse::<StageKind>().is_err());
    }
}
