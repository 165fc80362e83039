use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{StageContext, StageKind, StageOutput};
use crate::SchedulerResult;

/// 阶段处理器接口
///
/// 预测、异常检测等分析逻辑由外部模块实现，编排器只关心输出和成败。
#[async_trait]
pub trait StageProcessor: Send + Sync {
    async fn run(&self, context: &StageContext) -> SchedulerResult<StageOutput>;

    fn name(&self) -> &str;
}

/// 阶段 -> 处理器映射，启动时注册一次
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<StageKind, Arc<dyn StageProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stage: StageKind, processor: Arc<dyn StageProcessor>) {
        self.processors.insert(stage, processor);
    }

    pub fn with(mut self, stage: StageKind, processor: Arc<dyn StageProcessor>) -> Self {
        self.register(stage, processor);
        self
    }

    pub fn get(&self, stage: StageKind) -> Option<Arc<dyn StageProcessor>> {
        self.processors.get(&stage).cloned()
    }

    /// 尚未注册处理器的阶段
    pub fn missing_stages(&self) -> Vec<StageKind> {
        StageKind::ALL
            .into_iter()
            .filter(|stage| !self.processors.contains_key(stage))
            .collect()
    }
}
