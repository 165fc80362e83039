use std::sync::atomic::{AtomicU32, Ordering};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::debug;

use energy_core::config::OrchestratorConfig;
use energy_core::{
    SchedulerError, SchedulerResult, StageConfig, StageContext, StageError, StageOutput,
    StageProcessor, StageRecord,
};
use energy_infrastructure::{MetricsCollector, StructuredLogger, TimeoutHandler};

/// 阶段重试之间的退避策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 基础重试间隔
    pub base_delay: Duration,
    /// 最大重试间隔
    pub max_delay: Duration,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            backoff_multiplier: 2.0,
            jitter_factor: config.retry_jitter_factor,
        }
    }

    /// 第 `retry` 次重试（从1开始）前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let exponential =
            base * self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());

        // 随机抖动，避免多个阶段同时重试
        let jitter = capped * self.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }
}

/// 单个阶段的执行器：迭代细化、超时和重试
pub struct StageRunner {
    timeout_handler: TimeoutHandler,
    retry: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl StageRunner {
    pub fn new(retry: RetryPolicy, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            timeout_handler: TimeoutHandler::with_default_config(),
            retry,
            metrics,
        }
    }

    /// 执行一个阶段，失败用尽重试后返回带 `StageError` 的记录，不向上传播错误
    pub async fn run_stage(
        &self,
        processor: &dyn StageProcessor,
        config: &StageConfig,
        context: StageContext,
    ) -> StageRecord {
        let stage = context.stage;
        let total_attempts = config.total_attempts();
        let start = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=total_attempts {
            let mut attempt_context = context.clone();
            attempt_context.attempt = attempt;
            let iterations = AtomicU32::new(0);

            // 处理器 panic 记为一次失败的尝试，计入重试次数
            let guarded = AssertUnwindSafe(Self::iterate(
                processor,
                config.max_iterations,
                attempt_context,
                &iterations,
            ))
            .catch_unwind()
            .map(|caught| {
                caught.unwrap_or_else(|panic| {
                    Err(SchedulerError::stage_execution(
                        stage,
                        SchedulerError::from_panic("阶段处理器", panic).to_string(),
                    ))
                })
            });
            let result = self
                .timeout_handler
                .stage_operation(stage, config.timeout(), guarded)
                .await;

            match result {
                Ok(output) => {
                    let elapsed = start.elapsed();
                    let iterations = iterations.load(Ordering::SeqCst);
                    StructuredLogger::log_stage_completed(
                        stage,
                        attempt,
                        iterations,
                        elapsed.as_millis() as u64,
                    );
                    self.metrics
                        .record_stage_execution(stage, true, elapsed.as_secs_f64());
                    return StageRecord {
                        stage,
                        outcome: Ok(output),
                        attempts: attempt,
                        iterations,
                        elapsed,
                    };
                }
                Err(e) => {
                    if e.is_timeout() {
                        self.metrics.record_stage_timeout();
                    }
                    last_error = e.to_string();
                    if attempt < total_attempts {
                        StructuredLogger::log_stage_retry(stage, attempt, total_attempts, &last_error);
                        self.metrics.record_stage_retry();
                        let delay = self.retry.delay_for(attempt);
                        debug!("阶段 {} 将在 {:?} 后重试", stage, delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let elapsed = start.elapsed();
        StructuredLogger::log_stage_exhausted(stage, total_attempts, &last_error);
        self.metrics
            .record_stage_execution(stage, false, elapsed.as_secs_f64());
        StageRecord {
            stage,
            outcome: Err(StageError {
                stage,
                attempts: total_attempts,
                last_error,
            }),
            attempts: total_attempts,
            iterations: 0,
            elapsed,
        }
    }

    /// 同一次尝试内反复调用处理器，直到不再要求细化或达到最大迭代次数
    async fn iterate(
        processor: &dyn StageProcessor,
        max_iterations: u32,
        mut context: StageContext,
        iterations: &AtomicU32,
    ) -> SchedulerResult<StageOutput> {
        let max_iterations = max_iterations.max(1);
        let mut iteration = 1;
        loop {
            context.iteration = iteration;
            iterations.store(iteration, Ordering::SeqCst);
            let output = processor.run(&context).await?;
            if !output.needs_refinement || iteration >= max_iterations {
                return Ok(output);
            }
            debug!(
                "阶段 {} 请求继续细化 ({}/{})",
                context.stage, iteration, max_iterations
            );
            context.previous = Some(output);
            iteration += 1;
        }
    }
}

/// 处理器未注册时的失败记录
pub fn missing_processor_record(context: &StageContext, config: &StageConfig) -> StageRecord {
    let err = SchedulerError::ProcessorNotRegistered {
        stage: context.stage,
    };
    StageRecord {
        stage: context.stage,
        outcome: Err(StageError {
            stage: context.stage,
            attempts: config.total_attempts(),
            last_error: err.to_string(),
        }),
        attempts: 0,
        iterations: 0,
        elapsed: Duration::ZERO,
    }
}
