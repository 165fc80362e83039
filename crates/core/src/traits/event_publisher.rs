use async_trait::async_trait;

use crate::{models::Event, SchedulerResult};

/// 事件发布接口
///
/// 调度器和编排器只依赖此接口，事件总线的具体实现位于基础设施层。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// 发布事件，队列已满且未配置淘汰策略时返回 `QueueFull`
    async fn publish(&self, event: Event) -> SchedulerResult<()>;

    /// 当前排队的事件数量
    async fn queued(&self) -> usize;
}
