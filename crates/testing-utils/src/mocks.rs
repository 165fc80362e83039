//! Mock implementations of the capability traits
//!
//! In-memory doubles for data sources, stage processors and event
//! publishers. Each mock records its calls so tests can assert on them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use energy_core::{
    DataSource, DataType, Event, EventPriority, EventPublisher, EventType, Location, Reading,
    SchedulerError, SchedulerResult, StageContext, StageOutput, StageProcessor,
};

/// Scripted response of a [`MockDataSource`]
#[derive(Debug, Clone)]
pub enum SourceBehavior {
    Succeed(Vec<Reading>),
    Fail(String),
    /// Sleep before answering; pairs with paused-clock tests
    Delay(Duration, Vec<Reading>),
    /// Panic inside `fetch`, simulating a buggy adapter
    Panic(String),
}

/// Mock implementation of DataSource for testing
#[derive(Debug, Clone)]
pub struct MockDataSource {
    id: String,
    default_behavior: SourceBehavior,
    script: Arc<Mutex<VecDeque<SourceBehavior>>>,
    supported: Option<Vec<DataType>>,
    calls: Arc<AtomicUsize>,
}

impl MockDataSource {
    pub fn new(id: &str, behavior: SourceBehavior) -> Self {
        Self {
            id: id.to_string(),
            default_behavior: behavior,
            script: Arc::new(Mutex::new(VecDeque::new())),
            supported: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn succeeding(id: &str, readings: Vec<Reading>) -> Self {
        Self::new(id, SourceBehavior::Succeed(readings))
    }

    pub fn failing(id: &str, reason: &str) -> Self {
        Self::new(id, SourceBehavior::Fail(reason.to_string()))
    }

    pub fn slow(id: &str, delay: Duration, readings: Vec<Reading>) -> Self {
        Self::new(id, SourceBehavior::Delay(delay, readings))
    }

    pub fn panicking(id: &str, message: &str) -> Self {
        Self::new(id, SourceBehavior::Panic(message.to_string()))
    }

    /// Responses consumed in order before falling back to the default behavior
    pub fn with_script(self, script: Vec<SourceBehavior>) -> Self {
        *self.script.lock().unwrap() = script.into();
        self
    }

    pub fn supporting(mut self, data_types: Vec<DataType>) -> Self {
        self.supported = Some(data_types);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<dyn DataSource> {
        Arc::new(self)
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, data_type: DataType) -> bool {
        self.supported
            .as_ref()
            .map(|types| types.contains(&data_type))
            .unwrap_or(true)
    }

    async fn fetch(
        &self,
        _location: &Location,
        _data_type: DataType,
    ) -> SchedulerResult<Vec<Reading>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_behavior.clone());

        match behavior {
            SourceBehavior::Succeed(readings) => Ok(readings),
            SourceBehavior::Fail(reason) => Err(SchedulerError::source_fetch(&self.id, reason)),
            SourceBehavior::Delay(delay, readings) => {
                tokio::time::sleep(delay).await;
                Ok(readings)
            }
            SourceBehavior::Panic(message) => panic!("{message}"),
        }
    }
}

/// Mock implementation of StageProcessor for testing
///
/// Configured with builder methods; by default every call succeeds
/// immediately with a summary naming the stage and iteration.
#[derive(Debug)]
pub struct MockStageProcessor {
    name: String,
    failures_remaining: Mutex<Option<u32>>,
    delay: Option<Duration>,
    slow_calls_remaining: Mutex<Option<u32>>,
    refine_until: u32,
    escalate_to: Option<EventPriority>,
    panics_remaining: Mutex<Option<u32>>,
    calls: Mutex<Vec<StageContext>>,
}

impl MockStageProcessor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failures_remaining: Mutex::new(Some(0)),
            delay: None,
            slow_calls_remaining: Mutex::new(None),
            refine_until: 1,
            escalate_to: None,
            panics_remaining: Mutex::new(Some(0)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `times` calls, then succeed
    pub fn failing_times(self, times: u32) -> Self {
        *self.failures_remaining.lock().unwrap() = Some(times);
        self
    }

    pub fn always_failing(self) -> Self {
        *self.failures_remaining.lock().unwrap() = None;
        self
    }

    /// Panic on the first `times` calls, then behave normally
    pub fn panicking_times(self, times: u32) -> Self {
        *self.panics_remaining.lock().unwrap() = Some(times);
        self
    }

    pub fn always_panicking(self) -> Self {
        *self.panics_remaining.lock().unwrap() = None;
        self
    }

    /// Sleep on every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        *self.slow_calls_remaining.lock().unwrap() = None;
        self
    }

    /// Sleep only on the first `calls` calls
    pub fn slow_for(mut self, calls: u32, delay: Duration) -> Self {
        self.delay = Some(delay);
        *self.slow_calls_remaining.lock().unwrap() = Some(calls);
        self
    }

    /// Ask for refinement until the given iteration is reached
    pub fn refining_until(mut self, iteration: u32) -> Self {
        self.refine_until = iteration;
        self
    }

    pub fn escalating(mut self, priority: EventPriority) -> Self {
        self.escalate_to = Some(priority);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<StageContext> {
        self.calls.lock().unwrap().clone()
    }

    fn should_sleep(&self) -> Option<Duration> {
        let delay = self.delay?;
        let mut remaining = self.slow_calls_remaining.lock().unwrap();
        match remaining.as_mut() {
            None => Some(delay),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(delay)
            }
        }
    }

    fn should_panic(&self) -> bool {
        Self::take_one(&self.panics_remaining)
    }

    fn should_fail(&self) -> bool {
        Self::take_one(&self.failures_remaining)
    }

    /// `None` means always; `Some(n)` counts down to zero
    fn take_one(counter: &Mutex<Option<u32>>) -> bool {
        let mut remaining = counter.lock().unwrap();
        match remaining.as_mut() {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }
}

#[async_trait]
impl StageProcessor for MockStageProcessor {
    async fn run(&self, context: &StageContext) -> SchedulerResult<StageOutput> {
        self.calls.lock().unwrap().push(context.clone());

        if let Some(delay) = self.should_sleep() {
            tokio::time::sleep(delay).await;
        }
        if self.should_panic() {
            panic!("{} scripted panic", self.name);
        }
        if self.should_fail() {
            return Err(SchedulerError::stage_execution(
                context.stage,
                format!("{} scripted failure", self.name),
            ));
        }

        let mut output = StageOutput::new(format!(
            "{} attempt {} iteration {}",
            self.name, context.attempt, context.iteration
        ));
        if context.iteration < self.refine_until {
            output = output.refining();
        }
        if let Some(priority) = self.escalate_to {
            output = output.escalated(priority);
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Mock implementation of EventPublisher that records every event
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<Event>>>,
    reject: Arc<Mutex<bool>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail with `QueueFull`
    pub fn set_rejecting(&self, reject: bool) {
        *self.reject.lock().unwrap() = reject;
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_of(&self, event_type: EventType) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: Event) -> SchedulerResult<()> {
        if *self.reject.lock().unwrap() {
            return Err(SchedulerError::QueueFull { capacity: 0 });
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn queued(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}
