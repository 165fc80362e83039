//! Metrics collector for the telemetry scheduler
//!
//! 基于 `metrics` crate 的计数器、仪表和直方图。未安装全局 recorder 时所有记录都是空操作，
//! 因此测试中可以直接构造。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

use energy_core::StageKind;

pub struct MetricsCollector {
    // Collection metrics
    collections_total: Counter,
    collection_failures_total: Counter,
    collection_duration: Histogram,
    source_fallbacks_total: Counter,
    quality_score: Gauge,
    active_schedules: Gauge,

    // Event bus metrics
    events_published_total: Counter,
    events_rejected_total: Counter,
    events_evicted_total: Counter,
    event_queue_depth: Gauge,

    // Orchestration metrics
    stage_retries_total: Counter,
    stage_timeouts_total: Counter,
    workflow_runs_total: Counter,
    workflow_failures_total: Counter,
    preemptions_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            collections_total: counter!("energy_collections_total"),
            collection_failures_total: counter!("energy_collection_failures_total"),
            collection_duration: histogram!("energy_collection_duration_seconds"),
            source_fallbacks_total: counter!("energy_source_fallbacks_total"),
            quality_score: gauge!("energy_collection_quality_score"),
            active_schedules: gauge!("energy_active_schedules"),
            events_published_total: counter!("energy_events_published_total"),
            events_rejected_total: counter!("energy_events_rejected_total"),
            events_evicted_total: counter!("energy_events_evicted_total"),
            event_queue_depth: gauge!("energy_event_queue_depth"),
            stage_retries_total: counter!("energy_stage_retries_total"),
            stage_timeouts_total: counter!("energy_stage_timeouts_total"),
            workflow_runs_total: counter!("energy_workflow_runs_total"),
            workflow_failures_total: counter!("energy_workflow_failures_total"),
            preemptions_total: counter!("energy_demand_control_preemptions_total"),
        }
    }

    pub fn record_collection(&self, success: bool, duration_seconds: f64) {
        self.collections_total.increment(1);
        if !success {
            self.collection_failures_total.increment(1);
        }
        self.collection_duration.record(duration_seconds);
    }

    pub fn record_source_fallbacks(&self, count: usize) {
        if count > 0 {
            self.source_fallbacks_total.increment(count as u64);
        }
    }

    pub fn record_quality_score(&self, score: f64) {
        self.quality_score.set(score);
    }

    pub fn update_active_schedules(&self, count: usize) {
        self.active_schedules.set(count as f64);
    }

    pub fn record_event_published(&self, depth: usize) {
        self.events_published_total.increment(1);
        self.event_queue_depth.set(depth as f64);
    }

    pub fn record_event_rejected(&self) {
        self.events_rejected_total.increment(1);
    }

    pub fn record_event_evicted(&self) {
        self.events_evicted_total.increment(1);
    }

    pub fn update_queue_depth(&self, depth: usize) {
        self.event_queue_depth.set(depth as f64);
    }

    pub fn record_stage_execution(&self, stage: StageKind, success: bool, duration_seconds: f64) {
        let status = if success { "success" } else { "failed" };
        counter!("energy_stage_executions_total", "stage" => stage.as_str(), "status" => status)
            .increment(1);
        histogram!("energy_stage_duration_seconds", "stage" => stage.as_str())
            .record(duration_seconds);
        debug!(
            stage = stage.as_str(),
            status = status,
            duration_seconds = duration_seconds,
            "Stage execution recorded"
        );
    }

    pub fn record_stage_retry(&self) {
        self.stage_retries_total.increment(1);
    }

    pub fn record_stage_timeout(&self) {
        self.stage_timeouts_total.increment(1);
    }

    pub fn record_workflow_run(&self, completed: bool) {
        self.workflow_runs_total.increment(1);
        if !completed {
            self.workflow_failures_total.increment(1);
        }
    }

    pub fn record_preemption(&self) {
        self.preemptions_total.increment(1);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
