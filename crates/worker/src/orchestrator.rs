use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use energy_core::config::OrchestratorConfig;
use energy_core::{
    AlertNotice, CollectionResult, Event, EventPayload, EventPriority, IngestionOutcome,
    ProcessorRegistry, RunStatus, RunSummary, StageCompletion, StageConfig, StageContext,
    StageError, StageKind, StageRecord, WorkflowMode, WorkflowRun,
};
use energy_infrastructure::{EventBus, MetricsCollector, StructuredLogger};

use crate::stage_runner::{missing_processor_record, RetryPolicy, StageRunner};

const EVENT_SOURCE: &str = "orchestrator";

/// 一次事件处理周期的结果
#[derive(Debug, Default)]
pub struct ProcessingSummary {
    pub drained: usize,
    pub runs: Vec<WorkflowRun>,
    /// 因高优先级异常/告警而提前执行的需求控制
    pub preempted: Vec<StageRecord>,
    pub ingestion_failures: usize,
    pub ignored: usize,
}

/// 工作流编排器
///
/// 阶段配置在创建时解析一次，之后只读，被所有并发的阶段调用共享。
pub struct WorkflowOrchestrator {
    mode: WorkflowMode,
    stage_configs: HashMap<StageKind, StageConfig>,
    processors: ProcessorRegistry,
    runner: Arc<StageRunner>,
    bus: Arc<EventBus>,
    pool: Arc<Semaphore>,
    metrics: Arc<MetricsCollector>,
}

impl WorkflowOrchestrator {
    pub fn new(
        config: &OrchestratorConfig,
        processors: ProcessorRegistry,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let missing = processors.missing_stages();
        if !missing.is_empty() {
            warn!("以下阶段没有注册处理器，执行时将记为失败: {:?}", missing);
        }
        let stage_configs = StageKind::ALL
            .into_iter()
            .map(|stage| (stage, config.stage(stage)))
            .collect();

        Self {
            mode: config.mode,
            stage_configs,
            processors,
            runner: Arc::new(StageRunner::new(
                RetryPolicy::from_config(config),
                Arc::clone(&metrics),
            )),
            bus,
            pool: Arc::new(Semaphore::new(config.worker_pool_size.max(1))),
            metrics,
        }
    }

    pub fn mode(&self) -> WorkflowMode {
        self.mode
    }

    fn stage_config(&self, stage: StageKind) -> StageConfig {
        self.stage_configs
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| StageConfig::defaults_for(stage))
    }

    async fn execute_stage(&self, context: StageContext) -> StageRecord {
        let config = self.stage_config(context.stage);
        match self.processors.get(context.stage) {
            Some(processor) => {
                self.runner
                    .run_stage(processor.as_ref(), &config, context)
                    .await
            }
            None => missing_processor_record(&context, &config),
        }
    }

    /// 按配置的模式执行一次完整工作流
    pub async fn run_workflow(
        &self,
        collection: Option<CollectionResult>,
        trigger: Option<String>,
    ) -> WorkflowRun {
        match self.mode {
            WorkflowMode::Sequential => self.run_sequential(collection, trigger).await,
            WorkflowMode::Parallel => self.run_parallel(collection, trigger).await,
        }
    }

    /// 顺序执行：上游输出进入下游上下文，任一阶段失败则中止后续阶段
    pub async fn run_sequential(
        &self,
        collection: Option<CollectionResult>,
        trigger: Option<String>,
    ) -> WorkflowRun {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!("开始顺序工作流 {}", run_id);

        let mut records = Vec::with_capacity(StageKind::ALL.len());
        let mut upstream = BTreeMap::new();
        let mut status = RunStatus::Completed;

        for stage in StageKind::ALL {
            let mut context = StageContext::new(run_id, stage, collection.clone());
            context.upstream = upstream.clone();

            let record = self.execute_stage(context).await;
            let output = record.outcome.as_ref().ok().cloned();
            records.push(record);
            match output {
                Some(output) => {
                    upstream.insert(stage, output);
                }
                None => {
                    warn!("阶段 {} 失败，中止工作流 {} 的后续阶段", stage, run_id);
                    status = RunStatus::Failed { stage };
                    break;
                }
            }
        }

        let run = WorkflowRun {
            run_id,
            mode: WorkflowMode::Sequential,
            trigger,
            started_at,
            finished_at: Utc::now(),
            records,
            status,
        };
        self.finish_run(&run, start.elapsed()).await;
        run
    }

    /// 并行执行：各阶段使用同一份输入快照，互不依赖，结果按声明顺序合并
    pub async fn run_parallel(
        &self,
        collection: Option<CollectionResult>,
        trigger: Option<String>,
    ) -> WorkflowRun {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!("开始并行工作流 {}", run_id);

        let handles: Vec<_> = StageKind::ALL
            .into_iter()
            .map(|stage| {
                let context = StageContext::new(run_id, stage, collection.clone());
                let config = self.stage_config(stage);
                let processor = self.processors.get(stage);
                let runner = Arc::clone(&self.runner);
                let pool = Arc::clone(&self.pool);

                tokio::spawn(async move {
                    // 工作池限制同时执行的阶段数
                    let _permit = pool.acquire_owned().await.ok();
                    match processor {
                        Some(processor) => {
                            runner.run_stage(processor.as_ref(), &config, context).await
                        }
                        None => missing_processor_record(&context, &config),
                    }
                })
            })
            .collect();

        let mut records = Vec::with_capacity(StageKind::ALL.len());
        for (stage, joined) in StageKind::ALL.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!("阶段 {} 的执行任务异常退出: {}", stage, e);
                    records.push(StageRecord {
                        stage,
                        outcome: Err(StageError {
                            stage,
                            attempts: 0,
                            last_error: format!("执行任务异常退出: {e}"),
                        }),
                        attempts: 0,
                        iterations: 0,
                        elapsed: Duration::ZERO,
                    });
                }
            }
        }

        let failed: Vec<StageKind> = records
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.stage)
            .collect();
        let status = if failed.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::PartiallyFailed { failed }
        };

        let run = WorkflowRun {
            run_id,
            mode: WorkflowMode::Parallel,
            trigger,
            started_at,
            finished_at: Utc::now(),
            records,
            status,
        };
        self.finish_run(&run, start.elapsed()).await;
        run
    }

    /// 记录指标与日志，并发布阶段完成、告警和运行汇总事件
    async fn finish_run(&self, run: &WorkflowRun, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let status = match &run.status {
            RunStatus::Completed => "completed".to_string(),
            RunStatus::Failed { stage } => format!("failed at {stage}"),
            RunStatus::PartiallyFailed { failed } => format!("partially failed: {failed:?}"),
        };
        StructuredLogger::log_workflow_finished(
            &run.run_id.to_string(),
            &run.mode.to_string(),
            &status,
            elapsed_ms,
        );
        self.metrics.record_workflow_run(run.is_completed());

        let mut events: Vec<Event> = run
            .records
            .iter()
            .filter_map(|record| self.record_event(run.run_id, record))
            .collect();

        let (succeeded, failed): (Vec<&StageRecord>, Vec<&StageRecord>) =
            run.records.iter().partition(|r| r.is_success());
        events.push(Event::new(
            EVENT_SOURCE,
            EventPriority::Low,
            EventPayload::Reporting(RunSummary {
                run_id: run.run_id,
                mode: run.mode,
                status: run.status.clone(),
                succeeded: succeeded.iter().map(|r| r.stage).collect(),
                failed: failed.iter().map(|r| r.stage).collect(),
                elapsed_ms,
            }),
        ));

        self.publish_all(events).await;
    }

    /// 阶段结果对应的事件：成功的分析阶段发布完成事件，失败的阶段发布告警
    fn record_event(&self, run_id: Uuid, record: &StageRecord) -> Option<Event> {
        match &record.outcome {
            Ok(output) => {
                let completion = StageCompletion {
                    run_id,
                    stage: record.stage,
                    output: output.clone(),
                };
                let payload = match record.stage {
                    StageKind::Forecasting => EventPayload::Forecasting(completion),
                    StageKind::Anomaly => EventPayload::AnomalyDetection(completion),
                    StageKind::DemandControl => EventPayload::DemandControl(completion),
                    // 采集阶段完成不再产生采集事件，报告阶段由运行汇总代替
                    StageKind::DataIngestion | StageKind::Reporting => return None,
                };
                let priority = output.escalate_to.unwrap_or(EventPriority::Medium);
                Some(Event::new(EVENT_SOURCE, priority, payload).with_target(record.stage))
            }
            Err(stage_error) => Some(
                Event::new(
                    EVENT_SOURCE,
                    EventPriority::High,
                    EventPayload::Alert(AlertNotice {
                        stage: Some(stage_error.stage),
                        schedule_name: None,
                        message: format!(
                            "阶段 {} 在 {} 次尝试后失败: {}",
                            stage_error.stage, stage_error.attempts, stage_error.last_error
                        ),
                    }),
                )
                .with_target(stage_error.stage),
            ),
        }
    }

    async fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            if let Err(e) = self.bus.publish_event(event).await {
                StructuredLogger::log_system_error(EVENT_SOURCE, "publish_event", &e);
            }
        }
    }

    /// 高优先级的异常检测或告警事件需要立即执行需求控制；
    /// 需求控制自身的告警除外，避免循环触发
    pub fn should_preempt(event: &Event) -> bool {
        if event.priority() < EventPriority::High {
            return false;
        }
        match event.payload() {
            EventPayload::AnomalyDetection(_) => true,
            EventPayload::Alert(notice) => notice.stage != Some(StageKind::DemandControl),
            _ => false,
        }
    }

    /// 在正常节奏之外立即执行需求控制阶段
    pub async fn preempt_demand_control(&self, trigger: &Event) -> StageRecord {
        self.metrics.record_preemption();
        info!(
            "{} 事件 (优先级 {}) 触发需求控制",
            trigger.event_type(),
            trigger.priority()
        );

        let run_id = Uuid::new_v4();
        let mut context = StageContext::new(run_id, StageKind::DemandControl, None);
        if let EventPayload::AnomalyDetection(completion) = trigger.payload() {
            context
                .upstream
                .insert(StageKind::Anomaly, completion.output.clone());
        }

        let record = self.execute_stage(context).await;
        if let Some(event) = self.record_event(run_id, &record) {
            self.publish_all(vec![event]).await;
        }
        record
    }

    /// 排空事件总线一次，按优先级顺序处理
    pub async fn process_events(&self) -> ProcessingSummary {
        let events = self.bus.drain().await;
        let mut summary = ProcessingSummary {
            drained: events.len(),
            ..ProcessingSummary::default()
        };
        if events.is_empty() {
            return summary;
        }
        debug!("处理 {} 个事件", events.len());

        for event in events {
            if Self::should_preempt(&event) {
                let record = self.preempt_demand_control(&event).await;
                summary.preempted.push(record);
                continue;
            }

            match event.into_payload() {
                EventPayload::DataIngestion(IngestionOutcome::Collected(collection)) => {
                    let trigger = Some(collection.schedule_name.clone());
                    let run = self.run_workflow(Some(collection), trigger).await;
                    summary.runs.push(run);
                }
                EventPayload::DataIngestion(IngestionOutcome::Failed {
                    schedule_name,
                    reason,
                    consecutive_failures,
                }) => {
                    warn!(
                        "调度 {} 采集失败 (连续 {} 次): {}",
                        schedule_name, consecutive_failures, reason
                    );
                    summary.ingestion_failures += 1;
                }
                other => {
                    debug!("忽略事件 {}", other.event_type());
                    summary.ignored += 1;
                }
            }
        }

        info!(
            "事件处理完成: 共 {} 个, 工作流 {} 次, 抢占 {} 次",
            summary.drained,
            summary.runs.len(),
            summary.preempted.len()
        );
        summary
    }

    /// 事件处理循环，直到收到关闭信号
    pub async fn run(&self, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        info!("事件处理循环启动，间隔 {:?}", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.process_events().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("事件处理循环收到关闭信号");
                    break;
                }
            }
        }
    }
}
