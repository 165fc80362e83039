//! 工作流执行：阶段执行器、编排器和阶段处理器

pub mod orchestrator;
pub mod processors;
pub mod stage_runner;

pub use orchestrator::{ProcessingSummary, WorkflowOrchestrator};
pub use processors::{build_processor_registry, HttpStageProcessor, PassthroughProcessor};
pub use stage_runner::{RetryPolicy, StageRunner};
