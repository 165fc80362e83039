use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use energy_core::{EventPriority, EventType, SchedulerError, StageKind};

/// 结构化日志事件
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_schedule_registered(name: &str, source: &str, data_type: &str, frequency_minutes: u32) {
        info!(
            event = "schedule_registered",
            schedule.name = name,
            schedule.source = source,
            schedule.data_type = data_type,
            schedule.frequency_minutes = frequency_minutes,
            "Schedule registered"
        );
    }

    pub fn log_collection_dispatched(name: &str, scheduled_for: DateTime<Utc>) {
        info!(
            event = "collection_dispatched",
            schedule.name = name,
            schedule.due_at = %scheduled_for,
            "Collection dispatched"
        );
    }

    pub fn log_collection_completed(
        name: &str,
        source_used: &str,
        records: usize,
        quality_score: f64,
        duration_ms: u64,
    ) {
        info!(
            event = "collection_completed",
            schedule.name = name,
            collection.source = source_used,
            collection.records = records,
            collection.quality_score = quality_score,
            collection.duration_ms = duration_ms,
            "Collection completed"
        );
    }

    pub fn log_collection_failed(name: &str, consecutive_failures: u32, error: &SchedulerError) {
        warn!(
            event = "collection_failed",
            schedule.name = name,
            schedule.consecutive_failures = consecutive_failures,
            error = %error,
            "Collection failed"
        );
    }

    pub fn log_source_fallback(source: &str, reason: &str) {
        warn!(
            event = "source_fallback",
            source.id = source,
            source.reason = reason,
            "Source failed, falling back to next source"
        );
    }

    pub fn log_event_published(event_type: EventType, priority: EventPriority, depth: usize) {
        info!(
            event = "event_published",
            event.kind = %event_type,
            event.priority = %priority,
            queue.depth = depth,
            "Event published"
        );
    }

    pub fn log_event_rejected(event_type: EventType, priority: EventPriority, capacity: usize) {
        warn!(
            event = "event_rejected",
            event.kind = %event_type,
            event.priority = %priority,
            queue.capacity = capacity,
            "Event queue full, event rejected"
        );
    }

    pub fn log_event_evicted(event_type: EventType, priority: EventPriority) {
        warn!(
            event = "event_evicted",
            event.kind = %event_type,
            event.priority = %priority,
            "Event evicted to make room"
        );
    }

    pub fn log_stage_retry(stage: StageKind, attempt: u32, max_attempts: u32, reason: &str) {
        warn!(
            event = "stage_retry",
            stage = stage.as_str(),
            stage.attempt = attempt,
            stage.max_attempts = max_attempts,
            stage.reason = reason,
            "Stage attempt failed, retrying"
        );
    }

    pub fn log_stage_completed(stage: StageKind, attempts: u32, iterations: u32, duration_ms: u64) {
        info!(
            event = "stage_completed",
            stage = stage.as_str(),
            stage.attempts = attempts,
            stage.iterations = iterations,
            stage.duration_ms = duration_ms,
            "Stage completed"
        );
    }

    pub fn log_stage_exhausted(stage: StageKind, attempts: u32, last_error: &str) {
        error!(
            event = "stage_exhausted",
            stage = stage.as_str(),
            stage.attempts = attempts,
            stage.error = last_error,
            "Stage failed after exhausting retries"
        );
    }

    pub fn log_workflow_finished(run_id: &str, mode: &str, status: &str, duration_ms: u64) {
        info!(
            event = "workflow_finished",
            workflow.run_id = run_id,
            workflow.mode = mode,
            workflow.status = status,
            workflow.duration_ms = duration_ms,
            "Workflow run finished"
        );
    }

    pub fn log_system_error(component: &str, operation: &str, error: &SchedulerError) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error = %error,
            "System error occurred"
        );
    }
}
