use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use energy_core::{
    AlertNotice, Event, EventPayload, EventPriority, EventType, IngestionOutcome,
    ProcessorRegistry, RunStatus, StageCompletion, StageConfig, StageKind, StageOutput,
    WorkflowMode,
};
use energy_infrastructure::EventBus;
use energy_testing_utils::{
    orchestrator_config, sample_collection, test_metrics, MockStageProcessor,
};
use energy_worker::WorkflowOrchestrator;

struct Harness {
    orchestrator: WorkflowOrchestrator,
    bus: Arc<EventBus>,
    mocks: HashMap<StageKind, Arc<MockStageProcessor>>,
}

impl Harness {
    fn calls(&self, stage: StageKind) -> usize {
        self.mocks[&stage].call_count()
    }
}

fn harness(
    mode: WorkflowMode,
    stage: StageConfig,
    overrides: Vec<(StageKind, MockStageProcessor)>,
) -> Harness {
    let mut mocks: HashMap<StageKind, Arc<MockStageProcessor>> = StageKind::ALL
        .into_iter()
        .map(|stage| (stage, Arc::new(MockStageProcessor::new(stage.as_str()))))
        .collect();
    for (stage, mock) in overrides {
        mocks.insert(stage, Arc::new(mock));
    }

    let mut registry = ProcessorRegistry::new();
    for (stage, mock) in &mocks {
        registry.register(*stage, mock.clone());
    }

    let bus = Arc::new(EventBus::with_capacity(100));
    let orchestrator = WorkflowOrchestrator::new(
        &orchestrator_config(mode, stage),
        registry,
        Arc::clone(&bus),
        test_metrics(),
    );
    Harness {
        orchestrator,
        bus,
        mocks,
    }
}

fn event_types(events: &[Event]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type()).collect()
}

#[tokio::test]
async fn test_sequential_passes_upstream_outputs() {
    let h = harness(WorkflowMode::Sequential, StageConfig::new(1, 5, 0), vec![]);

    let run = h
        .orchestrator
        .run_sequential(Some(sample_collection("seoul")), Some("seoul".into()))
        .await;

    assert!(run.is_completed());
    assert_eq!(run.executed_stages(), StageKind::ALL.to_vec());
    let reporting_calls = h.mocks[&StageKind::Reporting].calls();
    assert_eq!(reporting_calls.len(), 1);
    assert_eq!(reporting_calls[0].upstream.len(), 4);
    assert!(reporting_calls[0].collection.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_sequential_failure_stops_downstream_stages() {
    let h = harness(
        WorkflowMode::Sequential,
        StageConfig::new(1, 5, 2),
        vec![(
            StageKind::Forecasting,
            MockStageProcessor::new("forecasting").always_failing(),
        )],
    );

    let run = h
        .orchestrator
        .run_sequential(Some(sample_collection("seoul")), None)
        .await;

    assert_eq!(
        run.status,
        RunStatus::Failed {
            stage: StageKind::Forecasting
        }
    );
    assert_eq!(
        run.executed_stages(),
        vec![StageKind::DataIngestion, StageKind::Forecasting]
    );
    assert_eq!(h.calls(StageKind::Forecasting), 3);
    assert_eq!(h.calls(StageKind::Anomaly), 0);
    assert_eq!(h.calls(StageKind::DemandControl), 0);
    assert_eq!(h.calls(StageKind::Reporting), 0);

    let record = run.record(StageKind::Forecasting).unwrap();
    let err = record.outcome.as_ref().unwrap_err();
    assert_eq!(err.attempts, 3);
    assert!(err.last_error.contains("scripted failure"));

    let events = h.bus.drain().await;
    let alerts: Vec<&Event> = events
        .iter()
        .filter(|e| e.event_type() == EventType::Alert)
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].priority(), EventPriority::High);
    assert!(event_types(&events).contains(&EventType::Reporting));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_failure_is_isolated() {
    let h = harness(
        WorkflowMode::Parallel,
        StageConfig::new(1, 5, 1),
        vec![(
            StageKind::Anomaly,
            MockStageProcessor::new("anomaly").always_failing(),
        )],
    );

    let run = h
        .orchestrator
        .run_parallel(Some(sample_collection("seoul")), None)
        .await;

    assert_eq!(
        run.status,
        RunStatus::PartiallyFailed {
            failed: vec![StageKind::Anomaly]
        }
    );
    assert_eq!(run.executed_stages(), StageKind::ALL.to_vec());
    assert!(run.record(StageKind::Forecasting).unwrap().is_success());
    assert!(run.record(StageKind::Reporting).unwrap().is_success());
    assert_eq!(h.calls(StageKind::Anomaly), 2);

    // 并行模式下各阶段互不读取输出
    for stage in StageKind::ALL {
        for context in h.mocks[&stage].calls() {
            assert!(context.upstream.is_empty());
        }
    }
}

#[tokio::test]
async fn test_run_workflow_follows_configured_mode() {
    let h = harness(WorkflowMode::Parallel, StageConfig::new(1, 5, 0), vec![]);
    let run = h.orchestrator.run_workflow(None, None).await;
    assert_eq!(run.mode, WorkflowMode::Parallel);
    assert!(run.is_completed());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_consumes_one_retry() {
    let h = harness(
        WorkflowMode::Sequential,
        StageConfig::new(1, 5, 2),
        vec![(
            StageKind::DataIngestion,
            MockStageProcessor::new("data_ingestion").slow_for(1, Duration::from_secs(30)),
        )],
    );

    let run = h.orchestrator.run_sequential(None, None).await;

    assert!(run.is_completed());
    let record = run.record(StageKind::DataIngestion).unwrap();
    assert_eq!(record.attempts, 2);
    assert_eq!(h.calls(StageKind::DataIngestion), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stage_that_always_times_out_is_exhausted() {
    let h = harness(
        WorkflowMode::Sequential,
        StageConfig::new(1, 5, 1),
        vec![(
            StageKind::DataIngestion,
            MockStageProcessor::new("data_ingestion").with_delay(Duration::from_secs(60)),
        )],
    );

    let run = h.orchestrator.run_sequential(None, None).await;

    let err = run
        .record(StageKind::DataIngestion)
        .unwrap()
        .outcome
        .as_ref()
        .unwrap_err()
        .clone();
    assert_eq!(err.attempts, 2);
    assert!(err.last_error.contains("超时"));
    assert_eq!(h.calls(StageKind::Forecasting), 0);
}

#[tokio::test]
async fn test_refinement_iterations_stay_within_one_attempt() {
    let h = harness(
        WorkflowMode::Sequential,
        StageConfig::new(5, 5, 2),
        vec![
            (
                StageKind::Forecasting,
                MockStageProcessor::new("forecasting").refining_until(3),
            ),
            (
                StageKind::Anomaly,
                MockStageProcessor::new("anomaly").refining_until(10),
            ),
        ],
    );

    let run = h.orchestrator.run_sequential(None, None).await;
    assert!(run.is_completed());

    let forecasting = run.record(StageKind::Forecasting).unwrap();
    assert_eq!(forecasting.attempts, 1);
    assert_eq!(forecasting.iterations, 3);
    let calls = h.mocks[&StageKind::Forecasting].calls();
    assert!(calls[0].previous.is_none());
    assert!(calls[2].previous.is_some());

    // 达到最大迭代次数时接受最后一次输出
    let anomaly = run.record(StageKind::Anomaly).unwrap();
    assert_eq!(anomaly.iterations, 5);
    assert_eq!(h.calls(StageKind::Anomaly), 5);
}

#[tokio::test]
async fn test_missing_processor_fails_stage() {
    let bus = Arc::new(EventBus::with_capacity(10));
    let orchestrator = WorkflowOrchestrator::new(
        &orchestrator_config(WorkflowMode::Sequential, StageConfig::new(1, 5, 0)),
        ProcessorRegistry::new(),
        bus,
        test_metrics(),
    );
    let run = orchestrator.run_sequential(None, None).await;
    assert_eq!(
        run.status,
        RunStatus::Failed {
            stage: StageKind::DataIngestion
        }
    );
}

#[tokio::test]
async fn test_process_events_runs_workflow_for_ingestion() {
    let h = harness(WorkflowMode::Sequential, StageConfig::new(1, 5, 0), vec![]);
    h.bus
        .publish_event(Event::new(
            "scheduler",
            EventPriority::Medium,
            EventPayload::DataIngestion(IngestionOutcome::Collected(sample_collection("seoul"))),
        ))
        .await
        .unwrap();
    h.bus
        .publish_event(Event::new(
            "scheduler",
            EventPriority::Medium,
            EventPayload::DataIngestion(IngestionOutcome::Failed {
                schedule_name: "busan".into(),
                reason: "all sources failed".into(),
                consecutive_failures: 1,
            }),
        ))
        .await
        .unwrap();

    let summary = h.orchestrator.process_events().await;

    assert_eq!(summary.drained, 2);
    assert_eq!(summary.runs.len(), 1);
    assert_eq!(summary.runs[0].trigger.as_deref(), Some("seoul"));
    assert_eq!(summary.ingestion_failures, 1);
    assert!(summary.preempted.is_empty());

    let follow_up = event_types(&h.bus.drain().await);
    assert!(follow_up.contains(&EventType::Forecasting));
    assert!(follow_up.contains(&EventType::AnomalyDetection));
    assert!(follow_up.contains(&EventType::DemandControl));
    assert!(follow_up.contains(&EventType::Reporting));
    assert!(!follow_up.contains(&EventType::DataIngestion));
}

#[tokio::test]
async fn test_high_priority_alert_preempts_demand_control() {
    let h = harness(WorkflowMode::Sequential, StageConfig::new(1, 5, 0), vec![]);
    h.bus
        .publish_event(Event::new(
            "scheduler",
            EventPriority::Medium,
            EventPayload::DataIngestion(IngestionOutcome::Collected(sample_collection("seoul"))),
        ))
        .await
        .unwrap();
    h.bus
        .publish_event(Event::new(
            "scheduler",
            EventPriority::High,
            EventPayload::Alert(AlertNotice {
                stage: None,
                schedule_name: Some("seoul".into()),
                message: "quality below threshold".into(),
            }),
        ))
        .await
        .unwrap();

    let summary = h.orchestrator.process_events().await;

    assert_eq!(summary.preempted.len(), 1);
    assert_eq!(summary.preempted[0].stage, StageKind::DemandControl);
    assert_eq!(summary.runs.len(), 1);

    // 告警先于采集事件出队，需求控制的第一次调用来自抢占
    let calls = h.mocks[&StageKind::DemandControl].calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].collection.is_none());
    assert!(calls[1].collection.is_some());
}

#[tokio::test]
async fn test_low_priority_and_demand_control_alerts_do_not_preempt() {
    let h = harness(WorkflowMode::Sequential, StageConfig::new(1, 5, 0), vec![]);
    let low_anomaly = Event::new(
        "orchestrator",
        EventPriority::Medium,
        EventPayload::AnomalyDetection(StageCompletion {
            run_id: uuid::Uuid::nil(),
            stage: StageKind::Anomaly,
            output: StageOutput::new("no anomalies"),
        }),
    );
    let self_alert = Event::new(
        "orchestrator",
        EventPriority::High,
        EventPayload::Alert(AlertNotice {
            stage: Some(StageKind::DemandControl),
            schedule_name: None,
            message: "demand control failed".into(),
        }),
    );
    assert!(!WorkflowOrchestrator::should_preempt(&low_anomaly));
    assert!(!WorkflowOrchestrator::should_preempt(&self_alert));

    h.bus.publish_event(low_anomaly).await.unwrap();
    h.bus.publish_event(self_alert).await.unwrap();
    let summary = h.orchestrator.process_events().await;

    assert!(summary.preempted.is_empty());
    assert_eq!(summary.ignored, 2);
    assert_eq!(h.calls(StageKind::DemandControl), 0);
}

#[tokio::test]
async fn test_escalated_anomaly_output_preempts_next_cycle() {
    let h = harness(
        WorkflowMode::Sequential,
        StageConfig::new(1, 5, 0),
        vec![(
            StageKind::Anomaly,
            MockStageProcessor::new("anomaly").escalating(EventPriority::Critical),
        )],
    );
    h.orchestrator
        .run_sequential(Some(sample_collection("seoul")), None)
        .await;
    assert_eq!(h.calls(StageKind::DemandControl), 1);

    let summary = h.orchestrator.process_events().await;
    assert_eq!(summary.preempted.len(), 1);
    assert_eq!(h.calls(StageKind::DemandControl), 2);
    let context = &h.mocks[&StageKind::DemandControl].calls()[1];
    assert!(context.upstream.contains_key(&StageKind::Anomaly));
}


#[tokio::test(start_paused = true)]
async fn test_sequential_panicking_stage_is_recorded_as_stage_error() {
    let h = harness(
        WorkflowMode::Sequential,
        StageConfig::new(1, 5, 2),
        vec![(
            StageKind::Forecasting,
            MockStageProcessor::new("forecasting").always_panicking(),
        )],
    );

    let run = h
        .orchestrator
        .run_sequential(Some(sample_collection("seoul")), None)
        .await;

    assert_eq!(
        run.status,
        RunStatus::Failed {
            stage: StageKind::Forecasting
        }
    );
    assert_eq!(h.calls(StageKind::Forecasting), 3);
    assert_eq!(h.calls(StageKind::Anomaly), 0);
    let err = run
        .record(StageKind::Forecasting)
        .unwrap()
        .outcome
        .as_ref()
        .unwrap_err();
    assert_eq!(err.attempts, 3);
    assert!(err.last_error.contains("scripted panic"));

    let alerts = h
        .bus
        .drain()
        .await
        .into_iter()
        .filter(|e| e.event_type() == EventType::Alert)
        .count();
    assert_eq!(alerts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_panic_consumes_one_retry() {
    let h = harness(
        WorkflowMode::Sequential,
        StageConfig::new(1, 5, 1),
        vec![(
            StageKind::Anomaly,
            MockStageProcessor::new("anomaly").panicking_times(1),
        )],
    );

    let run = h.orchestrator.run_sequential(None, None).await;

    assert!(run.is_completed());
    assert_eq!(run.record(StageKind::Anomaly).unwrap().attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_preemption_keeps_event_processing_alive() {
    let h = harness(
        WorkflowMode::Sequential,
        StageConfig::new(1, 5, 0),
        vec![(
            StageKind::DemandControl,
            MockStageProcessor::new("demand_control").always_panicking(),
        )],
    );
    h.bus
        .publish_event(Event::new(
            "scheduler",
            EventPriority::Critical,
            EventPayload::Alert(AlertNotice {
                stage: None,
                schedule_name: Some("seoul".into()),
                message: "source outage".into(),
            }),
        ))
        .await
        .unwrap();

    let summary = h.orchestrator.process_events().await;

    assert_eq!(summary.preempted.len(), 1);
    assert!(summary.preempted[0].outcome.is_err());

    // 下一轮处理照常进行
    h.bus
        .publish_event(Event::new(
            "scheduler",
            EventPriority::Medium,
            EventPayload::DataIngestion(IngestionOutcome::Collected(sample_collection("seoul"))),
        ))
        .await
        .unwrap();
    let summary = h.orchestrator.process_events().await;
    assert!(summary.preempted.is_empty());
    assert_eq!(summary.runs.len(), 1);
    assert_eq!(
        summary.runs[0].status,
        RunStatus::Failed {
            stage: StageKind::DemandControl
        }
    );
}
