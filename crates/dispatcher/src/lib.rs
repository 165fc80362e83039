//! 采集调度：质量校验、多数据源采集和调度注册表

pub mod collector;
pub mod quality;
pub mod scheduler;

pub use collector::MultiSourceCollector;
pub use quality::QualityValidator;
pub use scheduler::{DataCollectionScheduler, TickSummary};
