pub mod app_config;
pub mod orchestrator_observability;
pub mod quality_event_bus;
pub mod scheduler_collector;

pub use app_config::{AppConfig, ScheduleDefinition};
pub use orchestrator_observability::{ObservabilityConfig, OrchestratorConfig};
pub use quality_event_bus::{EventBusConfig, OverflowPolicy, QualityConfig};
pub use scheduler_collector::{CollectorConfig, SchedulerConfig};
