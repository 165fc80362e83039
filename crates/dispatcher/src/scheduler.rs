use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use energy_core::config::{CollectorConfig, SchedulerConfig};
use energy_core::{
    AlertNotice, CollectionResult, DataType, Event, EventPayload, EventPriority, EventPublisher,
    IngestionOutcome, Location, Schedule, ScheduleStatus, SchedulerError, SchedulerResult,
};
use energy_infrastructure::{MetricsCollector, StructuredLogger, TimeoutHandler};

use crate::collector::MultiSourceCollector;
use crate::quality::QualityValidator;

const EVENT_SOURCE: &str = "scheduler";

/// 一次 tick 的调度结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// 本次 tick 开始时应用的已完成采集数
    pub completions_applied: usize,
    pub dispatched: Vec<String>,
    /// 到期但上一次采集仍在进行
    pub skipped_in_flight: Vec<String>,
}

/// 后台采集作业的结果，由 tick 循环统一写回注册表
#[derive(Debug)]
struct AttemptOutcome {
    schedule_name: String,
    triggered_at: DateTime<Utc>,
    elapsed: Duration,
    result: SchedulerResult<CollectionResult>,
}

#[derive(Default)]
struct RegistryState {
    /// 按注册顺序保存
    schedules: Vec<Schedule>,
    in_flight: HashSet<String>,
}

impl RegistryState {
    fn find(&self, name: &str) -> Option<&Schedule> {
        self.schedules.iter().find(|s| s.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Schedule> {
        self.schedules.iter_mut().find(|s| s.name == name)
    }
}

/// 数据采集调度器
///
/// 独占调度注册表。tick 只负责挑出到期的调度并派发后台采集作业，
/// 作业完成后通过通道回传结果，注册表只在结果回到调度器后才更新。
pub struct DataCollectionScheduler {
    state: RwLock<RegistryState>,
    collector: Arc<MultiSourceCollector>,
    validator: QualityValidator,
    publisher: Arc<dyn EventPublisher>,
    timeout_handler: TimeoutHandler,
    config: SchedulerConfig,
    collector_config: CollectorConfig,
    permits: Arc<Semaphore>,
    completions_tx: mpsc::UnboundedSender<AttemptOutcome>,
    completions_rx: Mutex<mpsc::UnboundedReceiver<AttemptOutcome>>,
    metrics: Arc<MetricsCollector>,
}

impl DataCollectionScheduler {
    pub fn new(
        config: SchedulerConfig,
        collector_config: CollectorConfig,
        collector: Arc<MultiSourceCollector>,
        validator: QualityValidator,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            state: RwLock::new(RegistryState::default()),
            collector,
            validator,
            publisher,
            timeout_handler: TimeoutHandler::with_default_config(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_collections.max(1))),
            config,
            collector_config,
            completions_tx,
            completions_rx: Mutex::new(completions_rx),
            metrics,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 注册新的调度，立即到期
    pub async fn add_schedule(
        &self,
        name: &str,
        source: &str,
        location: Location,
        data_type: DataType,
        frequency_minutes: u32,
    ) -> SchedulerResult<Schedule> {
        let schedule = Schedule::new(
            name,
            source,
            location,
            data_type,
            frequency_minutes,
            Utc::now(),
        )?;

        let mut state = self.state.write().await;
        if state.find(name).is_some() {
            return Err(SchedulerError::duplicate_name(name));
        }
        if state.schedules.len() >= self.config.max_schedules {
            return Err(SchedulerError::ScheduleLimitReached {
                limit: self.config.max_schedules,
            });
        }
        state.schedules.push(schedule.clone());
        self.metrics
            .update_active_schedules(state.schedules.iter().filter(|s| s.enabled).count());
        drop(state);

        StructuredLogger::log_schedule_registered(
            name,
            source,
            data_type.as_str(),
            frequency_minutes,
        );
        Ok(schedule)
    }

    /// 停用调度，调度保留在注册表中；重复调用无副作用
    pub async fn stop_schedule(&self, name: &str) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        let schedule = state
            .find_mut(name)
            .ok_or_else(|| SchedulerError::schedule_not_found(name))?;
        if schedule.enabled {
            schedule.enabled = false;
            info!("调度 {} 已停止", name);
        } else {
            debug!("调度 {} 已处于停止状态", name);
        }
        self.metrics
            .update_active_schedules(state.schedules.iter().filter(|s| s.enabled).count());
        Ok(())
    }

    /// 重新启用调度，立即到期
    pub async fn resume_schedule(&self, name: &str) -> SchedulerResult<Schedule> {
        let mut state = self.state.write().await;
        let schedule = state
            .find_mut(name)
            .ok_or_else(|| SchedulerError::schedule_not_found(name))?;
        if !schedule.enabled {
            schedule.enabled = true;
            schedule.next_run_time = Utc::now();
            info!("调度 {} 已恢复", name);
        }
        let snapshot = schedule.clone();
        self.metrics
            .update_active_schedules(state.schedules.iter().filter(|s| s.enabled).count());
        Ok(snapshot)
    }

    pub async fn get_schedule(&self, name: &str) -> SchedulerResult<Schedule> {
        self.state
            .read()
            .await
            .find(name)
            .cloned()
            .ok_or_else(|| SchedulerError::schedule_not_found(name))
    }

    /// 已启用调度的快照，按注册顺序
    pub async fn list_active_schedules(&self) -> Vec<Schedule> {
        self.state
            .read()
            .await
            .schedules
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect()
    }

    /// 包括已停用调度在内的全部快照
    pub async fn list_schedules(&self) -> Vec<Schedule> {
        self.state.read().await.schedules.clone()
    }

    pub async fn in_flight_count(&self) -> usize {
        self.state.read().await.in_flight.len()
    }

    /// 派发所有到期且未在执行中的调度
    pub async fn tick(&self, now: DateTime<Utc>) -> TickSummary {
        let completions_applied = self.apply_pending_completions().await;
        let mut summary = TickSummary {
            completions_applied,
            ..TickSummary::default()
        };

        let mut state = self.state.write().await;
        let due: Vec<Schedule> = state
            .schedules
            .iter()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();

        for schedule in due {
            if state.in_flight.contains(&schedule.name) {
                debug!("调度 {} 上一次采集仍在进行，跳过", schedule.name);
                summary.skipped_in_flight.push(schedule.name);
                continue;
            }
            state.in_flight.insert(schedule.name.clone());
            if let Some(entry) = state.find_mut(&schedule.name) {
                entry.last_status = ScheduleStatus::Running;
            }
            StructuredLogger::log_collection_dispatched(&schedule.name, now);
            summary.dispatched.push(schedule.name.clone());
            self.spawn_collection(schedule, now);
        }
        drop(state);

        if !summary.dispatched.is_empty() {
            debug!(
                "tick {}: 派发 {} 个采集作业, 跳过 {} 个",
                now,
                summary.dispatched.len(),
                summary.skipped_in_flight.len()
            );
        }
        summary
    }

    fn spawn_collection(&self, schedule: Schedule, triggered_at: DateTime<Utc>) {
        let collector = Arc::clone(&self.collector);
        let validator = self.validator.clone();
        let permits = Arc::clone(&self.permits);
        let timeout_handler = self.timeout_handler.clone();
        let completions = self.completions_tx.clone();
        let sources = self
            .collector_config
            .source_chain(&schedule.source, schedule.data_type);

        tokio::spawn(async move {
            let start = Instant::now();
            let job = async {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|e| SchedulerError::internal(format!("采集并发许可已关闭: {e}")))?;
                let batch = collector
                    .collect(&schedule.location, schedule.data_type, &sources)
                    .await?;
                let report = validator.validate(&batch.readings);
                Ok::<_, SchedulerError>(CollectionResult::from_batch(
                    schedule.name.clone(),
                    triggered_at,
                    schedule.location,
                    schedule.data_type,
                    batch,
                    &report,
                ))
            };
            // 数据源或校验 panic 也必须回传结果，否则调度会一直停留在执行中
            let guarded = AssertUnwindSafe(job).catch_unwind().map(|caught| {
                caught.unwrap_or_else(|panic| Err(SchedulerError::from_panic("采集作业", panic)))
            });
            let result = timeout_handler
                .collection_operation(&schedule.name, schedule.deadline(), guarded)
                .await;

            let outcome = AttemptOutcome {
                schedule_name: schedule.name,
                triggered_at,
                elapsed: start.elapsed(),
                result,
            };
            if completions.send(outcome).is_err() {
                warn!("调度器已关闭，丢弃采集结果");
            }
        });
    }

    /// 应用所有已到达的采集结果，不等待
    async fn apply_pending_completions(&self) -> usize {
        let mut ready = Vec::new();
        {
            let mut rx = self.completions_rx.lock().await;
            while let Ok(outcome) = rx.try_recv() {
                ready.push(outcome);
            }
        }
        let count = ready.len();
        for outcome in ready {
            self.apply_completion(outcome).await;
        }
        count
    }

    /// 等待所有执行中的采集完成并写回注册表
    pub async fn wait_for_in_flight(&self) -> usize {
        let mut applied = self.apply_pending_completions().await;
        while self.in_flight_count().await > 0 {
            let outcome = self.completions_rx.lock().await.recv().await;
            match outcome {
                Some(outcome) => {
                    self.apply_completion(outcome).await;
                    applied += 1;
                }
                None => break,
            }
        }
        applied
    }

    async fn apply_completion(&self, outcome: AttemptOutcome) {
        let AttemptOutcome {
            schedule_name,
            triggered_at,
            elapsed,
            result,
        } = outcome;

        let mut state = self.state.write().await;
        state.in_flight.remove(&schedule_name);
        let Some(schedule) = state.find_mut(&schedule_name) else {
            warn!("采集结果对应的调度 {} 不存在", schedule_name);
            return;
        };

        let mut events = Vec::new();
        match result {
            Ok(collection) => {
                schedule.record_attempt(
                    triggered_at,
                    ScheduleStatus::Succeeded {
                        source_used: collection.source_used.clone(),
                        quality_score: collection.quality_score,
                    },
                );
                StructuredLogger::log_collection_completed(
                    &schedule_name,
                    &collection.source_used,
                    collection.readings.len(),
                    collection.quality_score,
                    elapsed.as_millis() as u64,
                );
                self.metrics.record_collection(true, elapsed.as_secs_f64());
                self.metrics.record_quality_score(collection.quality_score);

                if collection.quality_score < self.config.min_quality_score {
                    warn!(
                        "调度 {} 的数据质量 {:.3} 低于阈值 {:.3}",
                        schedule_name, collection.quality_score, self.config.min_quality_score
                    );
                    events.push(Event::new(
                        EVENT_SOURCE,
                        EventPriority::High,
                        EventPayload::Alert(AlertNotice {
                            stage: None,
                            schedule_name: Some(schedule_name.clone()),
                            message: format!(
                                "数据质量分数 {:.3} 低于阈值 {:.3}",
                                collection.quality_score, self.config.min_quality_score
                            ),
                        }),
                    ));
                }
                events.insert(
                    0,
                    Event::new(
                        EVENT_SOURCE,
                        EventPriority::Medium,
                        EventPayload::DataIngestion(IngestionOutcome::Collected(collection)),
                    ),
                );
            }
            Err(err) => {
                schedule.record_attempt(
                    triggered_at,
                    ScheduleStatus::Failed {
                        reason: err.to_string(),
                    },
                );
                let failures = schedule.consecutive_failures;
                StructuredLogger::log_collection_failed(&schedule_name, failures, &err);
                self.metrics.record_collection(false, elapsed.as_secs_f64());

                let priority = if failures >= self.config.failure_escalation_threshold {
                    EventPriority::High
                } else {
                    EventPriority::Medium
                };
                events.push(Event::new(
                    EVENT_SOURCE,
                    priority,
                    EventPayload::DataIngestion(IngestionOutcome::Failed {
                        schedule_name: schedule_name.clone(),
                        reason: err.to_string(),
                        consecutive_failures: failures,
                    }),
                ));
            }
        }
        drop(state);

        for event in events {
            if let Err(e) = self.publisher.publish(event).await {
                StructuredLogger::log_system_error(EVENT_SOURCE, "publish_event", &e);
            }
        }
    }

    /// 调度循环，直到收到关闭信号；退出前在宽限期内等待执行中的采集
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_seconds));
        info!(
            "调度循环启动，间隔 {} 秒",
            self.config.tick_interval_seconds
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
                outcome = async { self.completions_rx.lock().await.recv().await } => {
                    if let Some(outcome) = outcome {
                        self.apply_completion(outcome).await;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("调度循环收到关闭信号");
                    break;
                }
            }
        }

        let grace = Duration::from_secs(self.config.shutdown_grace_seconds);
        match tokio::time::timeout(grace, self.wait_for_in_flight()).await {
            Ok(applied) => info!("调度循环已停止，收尾应用 {} 个采集结果", applied),
            Err(_) => error!(
                "等待执行中的采集超过宽限期 {:?}，仍有 {} 个未完成",
                grace,
                self.in_flight_count().await
            ),
        }
    }
}
