//! 遥测采集调度系统的核心类型
//!
//! 包含统一错误类型、领域模型（调度、记录、事件、阶段）、
//! 外部能力接口（数据源、阶段处理器、事件发布）以及配置模型。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use errors::*;
pub use models::*;
pub use traits::*;
