use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::StageKind;

/// 单个数据源的失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

impl SourceFailure {
    pub fn new<S: Into<String>, R: Into<String>>(source: S, reason: R) -> Self {
        Self {
            source: source.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

fn join_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// 调度器错误类型定义
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("调度名称已存在: {name}")]
    DuplicateName { name: String },

    #[error("调度未找到: {name}")]
    ScheduleNotFound { name: String },

    #[error("无效的调度参数: {0}")]
    InvalidSchedule(String),

    #[error("调度数量已达上限: {limit}")]
    ScheduleLimitReached { limit: usize },

    #[error("数据源 {source_id} 超时 (超时时间: {timeout_seconds}秒)")]
    SourceTimeout {
        source_id: String,
        timeout_seconds: u64,
    },

    #[error("数据源 {source_id} 请求失败: {message}")]
    SourceFetch { source_id: String, message: String },

    #[error("所有数据源均失败: {}", join_failures(.failures))]
    AllSourcesFailed { failures: Vec<SourceFailure> },

    #[error("采集超时: 调度 {schedule} 超过了 {deadline_seconds} 秒的截止时间")]
    CollectionDeadlineExceeded {
        schedule: String,
        deadline_seconds: u64,
    },

    #[error("事件队列已满 (容量: {capacity})")]
    QueueFull { capacity: usize },

    #[error("阶段 {stage} 执行超时 (超时时间: {timeout_seconds}秒)")]
    StageTimeout { stage: StageKind, timeout_seconds: u64 },

    #[error("阶段 {stage} 在 {attempts} 次尝试后仍然失败: {last_error}")]
    StageExhausted {
        stage: StageKind,
        attempts: u32,
        last_error: String,
    },

    #[error("阶段 {stage} 执行错误: {message}")]
    StageExecution { stage: StageKind, message: String },

    #[error("阶段 {stage} 没有注册处理器")]
    ProcessorNotRegistered { stage: StageKind },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    pub fn duplicate_name<S: Into<String>>(name: S) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    pub fn schedule_not_found<S: Into<String>>(name: S) -> Self {
        Self::ScheduleNotFound { name: name.into() }
    }

    pub fn invalid_schedule<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSchedule(msg.into())
    }

    pub fn source_fetch<S: Into<String>, M: Into<String>>(source_id: S, message: M) -> Self {
        Self::SourceFetch {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    pub fn stage_execution<M: Into<String>>(stage: StageKind, message: M) -> Self {
        Self::StageExecution {
            stage,
            message: message.into(),
        }
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// 由捕获的 panic 构造内部错误
    pub fn from_panic(context: &str, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "未知 panic".to_string());
        Self::Internal(format!("{context} panic: {message}"))
    }

    /// 超时类错误
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SchedulerError::SourceTimeout { .. }
                | SchedulerError::StageTimeout { .. }
                | SchedulerError::CollectionDeadlineExceeded { .. }
        )
    }

    /// 下一次调度或重试有可能恢复的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::SourceTimeout { .. }
                | SchedulerError::SourceFetch { .. }
                | SchedulerError::AllSourcesFailed { .. }
                | SchedulerError::CollectionDeadlineExceeded { .. }
                | SchedulerError::StageTimeout { .. }
                | SchedulerError::StageExecution { .. }
                | SchedulerError::QueueFull { .. }
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_panic_keeps_message() {
        let err = SchedulerError::from_panic("采集", Box::new("boom"));
        assert!(err.to_string().contains("采集 panic: boom"));
        let err = SchedulerError::from_panic("阶段", Box::new(String::from("owned")));
        assert!(err.to_string().contains("owned"));
        let err = SchedulerError::from_panic("阶段", Box::new(42_u32));
        assert!(err.to_string().contains("未知 panic"));
    }

    #[test]
    fn test_all_sources_failed_lists_every_reason() {
        let err = SchedulerError::AllSourcesFailed {
            failures: vec![
                SourceFailure::new("openweather", "HTTP 500"),
                SourceFailure::new("weatherapi", "超时"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("openweather: HTTP 500"));
        assert!(msg.contains("weatherapi: 超时"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_classification() {
        let timeout = SchedulerError::StageTimeout {
            stage: StageKind::Forecasting,
            timeout_seconds: 5,
        };
        assert!(timeout.is_timeout());
        assert!(!SchedulerError::duplicate_name("a").is_retryable());
        assert!(!SchedulerError::schedule_not_found("a").is_timeout());
    }
}
