use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CollectionResult, RunStatus, StageKind, StageOutput, WorkflowMode};

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    DataIngestion,
    Forecasting,
    AnomalyDetection,
    DemandControl,
    Reporting,
    Alert,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::DataIngestion => "DATA_INGESTION",
            EventType::Forecasting => "FORECASTING",
            EventType::AnomalyDetection => "ANOMALY_DETECTION",
            EventType::DemandControl => "DEMAND_CONTROL",
            EventType::Reporting => "REPORTING",
            EventType::Alert => "ALERT",
        };
        f.write_str(name)
    }
}

/// 事件优先级，1=低 2=中 3=高 4=紧急
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl EventPriority {
    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(EventPriority::Low),
            2 => Some(EventPriority::Medium),
            3 => Some(EventPriority::High),
            4 => Some(EventPriority::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventPriority::Low => "low",
            EventPriority::Medium => "medium",
            EventPriority::High => "high",
            EventPriority::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// 数据采集事件的结果部分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestionOutcome {
    Collected(CollectionResult),
    Failed {
        schedule_name: String,
        reason: String,
        consecutive_failures: u32,
    },
}

/// 阶段完成事件的内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCompletion {
    pub run_id: Uuid,
    pub stage: StageKind,
    pub output: StageOutput,
}

/// 工作流运行结束时的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: WorkflowMode,
    pub status: RunStatus,
    pub succeeded: Vec<StageKind>,
    pub failed: Vec<StageKind>,
    pub elapsed_ms: u64,
}

/// 告警内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotice {
    /// 出错的阶段；采集相关告警为空
    pub stage: Option<StageKind>,
    pub schedule_name: Option<String>,
    pub message: String,
}

/// 按事件类型划分的负载，每种变体只携带该状态转换所需的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    DataIngestion(IngestionOutcome),
    Forecasting(StageCompletion),
    AnomalyDetection(StageCompletion),
    DemandControl(StageCompletion),
    Reporting(RunSummary),
    Alert(AlertNotice),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::DataIngestion(_) => EventType::DataIngestion,
            EventPayload::Forecasting(_) => EventType::Forecasting,
            EventPayload::AnomalyDetection(_) => EventType::AnomalyDetection,
            EventPayload::DemandControl(_) => EventType::DemandControl,
            EventPayload::Reporting(_) => EventType::Reporting,
            EventPayload::Alert(_) => EventType::Alert,
        }
    }
}

/// 事件，创建后不可变；优先级在入队期间保持不变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: Uuid,
    timestamp: DateTime<Utc>,
    source_stage: String,
    target_stage: Option<StageKind>,
    priority: EventPriority,
    payload: EventPayload,
}

impl Event {
    pub fn new(
        source_stage: impl Into<String>,
        priority: EventPriority,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source_stage: source_stage.into(),
            target_stage: None,
            priority,
            payload,
        }
    }

    pub fn with_target(mut self, target: StageKind) -> Self {
        self.target_stage = Some(target);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_stage(&self) -> &str {
        &self.source_stage
    }

    pub fn target_stage(&self) -> Option<StageKind> {
        self.target_stage
    }

    pub fn priority(&self) -> EventPriority {
        self.priority
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn into_payload(self) -> EventPayload {
        self.payload
    }
}
