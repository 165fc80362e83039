use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use energy_core::config::{EventBusConfig, OverflowPolicy};
use energy_core::{Event, EventPublisher, SchedulerError, SchedulerResult};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::observability::{MetricsCollector, StructuredLogger};

/// 队列中的事件，按 优先级 -> 时间戳 -> 入队序号 排序
#[derive(Debug)]
struct QueuedEvent {
    event: Event,
    sequence: u64,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap 是大顶堆：优先级高者大，同优先级时更早者大
        self.event
            .priority()
            .cmp(&other.event.priority())
            .then_with(|| other.event.timestamp().cmp(&self.event.timestamp()))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// 事件总线统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBusStats {
    pub queued: usize,
    pub capacity: usize,
    pub published_total: u64,
    pub rejected_total: u64,
    pub evicted_total: u64,
    pub delivered_total: u64,
}

/// 有界优先级事件总线
///
/// 允许多个发布者并发发布；`poll` / `drain` 在同一把锁下串行出队。
/// 总线不解释事件类型，事件路由由编排器负责。
pub struct EventBus {
    queue: Mutex<BinaryHeap<QueuedEvent>>,
    config: EventBusConfig,
    sequence: AtomicU64,
    published_total: AtomicU64,
    rejected_total: AtomicU64,
    evicted_total: AtomicU64,
    delivered_total: AtomicU64,
    observers: broadcast::Sender<Event>,
    metrics: Arc<MetricsCollector>,
}

impl EventBus {
    pub fn new(config: EventBusConfig, metrics: Arc<MetricsCollector>) -> Self {
        info!(
            "创建事件总线: 容量={}, 溢出策略={:?}",
            config.capacity, config.overflow_policy
        );
        let (observers, _) = broadcast::channel(config.subscriber_buffer.max(1));
        Self {
            queue: Mutex::new(BinaryHeap::with_capacity(config.capacity)),
            config,
            sequence: AtomicU64::new(0),
            published_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
            delivered_total: AtomicU64::new(0),
            observers,
            metrics,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(
            EventBusConfig {
                capacity,
                ..EventBusConfig::default()
            },
            Arc::new(MetricsCollector::new()),
        )
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// 发布事件
    pub async fn publish_event(&self, event: Event) -> SchedulerResult<()> {
        let event_type = event.event_type();
        let priority = event.priority();

        let depth = {
            let mut queue = self.queue.lock().await;
            if queue.len() >= self.config.capacity {
                match self.config.overflow_policy {
                    OverflowPolicy::Reject => {
                        self.reject(&event);
                        return Err(SchedulerError::QueueFull {
                            capacity: self.config.capacity,
                        });
                    }
                    OverflowPolicy::DropOldestLowPriority => {
                        if !Self::evict_lowest(&mut queue, &event) {
                            self.reject(&event);
                            return Err(SchedulerError::QueueFull {
                                capacity: self.config.capacity,
                            });
                        }
                        self.evicted_total.fetch_add(1, AtomicOrdering::Relaxed);
                        self.metrics.record_event_evicted();
                    }
                }
            }

            let sequence = self.sequence.fetch_add(1, AtomicOrdering::Relaxed);
            // 没有观察者时发送失败是正常情况
            let _ = self.observers.send(event.clone());
            queue.push(QueuedEvent { event, sequence });
            queue.len()
        };

        self.published_total.fetch_add(1, AtomicOrdering::Relaxed);
        self.metrics.record_event_published(depth);
        StructuredLogger::log_event_published(event_type, priority, depth);
        Ok(())
    }

    /// 取出优先级最高的事件
    pub async fn poll(&self) -> Option<Event> {
        let mut queue = self.queue.lock().await;
        let next = queue.pop().map(|queued| queued.event);
        if next.is_some() {
            self.delivered_total.fetch_add(1, AtomicOrdering::Relaxed);
            self.metrics.update_queue_depth(queue.len());
        }
        next
    }

    /// 按优先级顺序取出当前全部事件，不等待新事件
    pub async fn drain(&self) -> Vec<Event> {
        let mut queue = self.queue.lock().await;
        let mut events = Vec::with_capacity(queue.len());
        while let Some(queued) = queue.pop() {
            events.push(queued.event);
        }
        self.delivered_total
            .fetch_add(events.len() as u64, AtomicOrdering::Relaxed);
        self.metrics.update_queue_depth(0);
        debug!("事件总线排空 {} 个事件", events.len());
        events
    }

    /// 订阅所有被接受的事件副本，不影响队列内容
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.observers.subscribe()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    pub async fn stats(&self) -> EventBusStats {
        EventBusStats {
            queued: self.len().await,
            capacity: self.config.capacity,
            published_total: self.published_total.load(AtomicOrdering::Relaxed),
            rejected_total: self.rejected_total.load(AtomicOrdering::Relaxed),
            evicted_total: self.evicted_total.load(AtomicOrdering::Relaxed),
            delivered_total: self.delivered_total.load(AtomicOrdering::Relaxed),
        }
    }

    fn reject(&self, event: &Event) {
        self.rejected_total.fetch_add(1, AtomicOrdering::Relaxed);
        self.metrics.record_event_rejected();
        StructuredLogger::log_event_rejected(
            event.event_type(),
            event.priority(),
            self.config.capacity,
        );
    }

    /// 淘汰最早的最低优先级事件；被淘汰者的优先级不得高于新事件
    fn evict_lowest(queue: &mut BinaryHeap<QueuedEvent>, incoming: &Event) -> bool {
        let oldest_lowest = queue.iter().min_by(|a, b| {
            a.event
                .priority()
                .cmp(&b.event.priority())
                .then_with(|| a.event.timestamp().cmp(&b.event.timestamp()))
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        let Some(victim) = oldest_lowest.map(|q| q.sequence) else {
            return false;
        };
        let mut items = std::mem::take(queue).into_vec();
        let Some(index) = items.iter().position(|q| q.sequence == victim) else {
            *queue = items.into();
            return false;
        };
        if items[index].event.priority() > incoming.priority() {
            *queue = items.into();
            return false;
        }
        let evicted = items.swap_remove(index);
        StructuredLogger::log_event_evicted(evicted.event.event_type(), evicted.event.priority());
        *queue = items.into();
        true
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: Event) -> SchedulerResult<()> {
        self.publish_event(event).await
    }

    async fn queued(&self) -> usize {
        self.len().await
    }
}
