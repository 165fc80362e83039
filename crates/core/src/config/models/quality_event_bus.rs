use serde::{Deserialize, Serialize};

/// 质量分数中各项比例的权重
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub missing_weight: f64,
    pub duplicate_weight: f64,
    pub outlier_weight: f64,
    pub iqr_multiplier: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            missing_weight: 1.0,
            duplicate_weight: 1.0,
            outlier_weight: 1.0,
            iqr_multiplier: 1.5,
        }
    }
}

impl QualityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let weights = [self.missing_weight, self.duplicate_weight, self.outlier_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(anyhow::anyhow!("质量权重必须为非负数: {weights:?}"));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(anyhow::anyhow!("质量权重之和必须大于0"));
        }
        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier <= 0.0 {
            return Err(anyhow::anyhow!("IQR倍数必须大于0"));
        }
        Ok(())
    }
}

/// 队列满时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 拒绝新事件
    Reject,
    /// 淘汰最早的最低优先级事件（仅当其优先级低于或等于新事件）
    DropOldestLowPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub processing_interval_seconds: u64,
    /// 观察者广播通道容量
    pub subscriber_buffer: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            overflow_policy: OverflowPolicy::Reject,
            processing_interval_seconds: 30,
            subscriber_buffer: 256,
        }
    }
}

impl EventBusConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.capacity == 0 {
            return Err(anyhow::anyhow!("事件队列容量必须大于0"));
        }
        if self.processing_interval_seconds == 0 {
            return Err(anyhow::anyhow!("事件处理间隔必须大于0"));
        }
        if self.subscriber_buffer == 0 {
            return Err(anyhow::anyhow!("订阅缓冲区大小必须大于0"));
        }
        Ok(())
    }
}
