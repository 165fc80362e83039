//! 外部数据源接口
//!
//! 数据源适配器（OpenWeather、WeatherAPI、NOAA 等）实现 [`DataSource`]，
//! 由多数据源采集器按优先级顺序调用。适配器只负责一次请求，
//! 超时、回退和重试都由调用方处理。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{DataType, Location, Reading};
use crate::SchedulerResult;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// 数据源标识，例如 `openweather`
    fn id(&self) -> &str;

    /// 获取指定位置和数据类型的记录
    async fn fetch(&self, location: &Location, data_type: DataType)
        -> SchedulerResult<Vec<Reading>>;

    fn supports(&self, _data_type: DataType) -> bool {
        true
    }
}

/// 数据源注册表：标识 -> 实现
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn DataSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn DataSource>) {
        self.sources.insert(source.id().to_string(), source);
    }

    pub fn with(mut self, source: Arc<dyn DataSource>) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.keys().cloned().collect();
        ids.sort();
        ids
    }
}
