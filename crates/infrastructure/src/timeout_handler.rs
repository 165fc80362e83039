//! Timeout handling utilities for async operations
//!
//! 所有外部调用（数据源请求、阶段处理器、单次采集作业）都通过这里施加截止时间，
//! 超时会转换为对应的失败结果，而不是被静默忽略。

use std::future::Future;
use std::time::Duration;

use energy_core::{SchedulerError, SchedulerResult, StageKind};
use tokio::time::timeout;
use tracing::{error, warn};

/// Default timeout values for different operation types
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// 单个数据源请求的超时时间，与调用方的截止时间无关
    pub source_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(10),
        }
    }
}

impl TimeoutConfig {
    pub fn with_source_timeout(source_timeout: Duration) -> Self {
        Self { source_timeout }
    }
}

/// Timeout handler utility for async operations
#[derive(Debug, Clone)]
pub struct TimeoutHandler {
    config: TimeoutConfig,
}

impl TimeoutHandler {
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(TimeoutConfig::default())
    }

    pub fn source_timeout(&self) -> Duration {
        self.config.source_timeout
    }

    /// 数据源请求，超时返回 `SourceTimeout`
    pub async fn source_operation<F, T>(&self, source_id: &str, operation: F) -> SchedulerResult<T>
    where
        F: Future<Output = SchedulerResult<T>>,
    {
        let limit = self.config.source_timeout;
        Self::execute_with_timeout(operation, limit, || {
            warn!("数据源 '{source_id}' 请求超时 (超时时间: {limit:?})");
            SchedulerError::SourceTimeout {
                source_id: source_id.to_string(),
                timeout_seconds: limit.as_secs(),
            }
        })
        .await
    }

    /// 阶段处理器的一次尝试，超时返回 `StageTimeout`
    pub async fn stage_operation<F, T>(
        &self,
        stage: StageKind,
        limit: Duration,
        operation: F,
    ) -> SchedulerResult<T>
    where
        F: Future<Output = SchedulerResult<T>>,
    {
        Self::execute_with_timeout(operation, limit, || {
            warn!("阶段 '{stage}' 执行超时 (超时时间: {limit:?})");
            SchedulerError::StageTimeout {
                stage,
                timeout_seconds: limit.as_secs(),
            }
        })
        .await
    }

    /// 单次采集作业，截止时间等于调度周期
    pub async fn collection_operation<F, T>(
        &self,
        schedule: &str,
        deadline: Duration,
        operation: F,
    ) -> SchedulerResult<T>
    where
        F: Future<Output = SchedulerResult<T>>,
    {
        Self::execute_with_timeout(operation, deadline, || {
            error!("调度 '{schedule}' 的采集作业超过截止时间 {deadline:?}，已取消");
            SchedulerError::CollectionDeadlineExceeded {
                schedule: schedule.to_string(),
                deadline_seconds: deadline.as_secs(),
            }
        })
        .await
    }

    async fn execute_with_timeout<F, T, E>(
        operation: F,
        limit: Duration,
        on_timeout: E,
    ) -> SchedulerResult<T>
    where
        F: Future<Output = SchedulerResult<T>>,
        E: FnOnce() -> SchedulerError,
    {
        match timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout()),
        }
    }
}
