use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use energy_core::config::AppConfig;
use energy_core::{EventPublisher, ProcessorRegistry, SourceRegistry};
use energy_dispatcher::{DataCollectionScheduler, MultiSourceCollector, QualityValidator};
use energy_infrastructure::{
    EventBus, MetricsCollector, OpenWeatherSource, TimeoutConfig, TimeoutHandler,
};
use energy_worker::{build_processor_registry, WorkflowOrchestrator};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行采集调度
    Scheduler,
    /// 仅运行事件处理与工作流编排
    Orchestrator,
    /// 运行所有组件
    All,
}

impl std::str::FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduler" => Ok(AppMode::Scheduler),
            "orchestrator" => Ok(AppMode::Orchestrator),
            "all" => Ok(AppMode::All),
            other => Err(anyhow::anyhow!("无效的运行模式: {other}")),
        }
    }
}

/// 应用上下文，持有所有组件
///
/// 所有依赖在这里显式构造并注入，组件之间不共享全局状态。
pub struct AppContext {
    config: AppConfig,
    metrics: Arc<MetricsCollector>,
    event_bus: Arc<EventBus>,
    scheduler: Arc<DataCollectionScheduler>,
    orchestrator: Arc<WorkflowOrchestrator>,
}

impl AppContext {
    /// 按配置构造，数据源与阶段处理器均来自配置
    pub fn new(config: AppConfig) -> Result<Self> {
        let sources = default_sources(&config);
        let processors = build_processor_registry(&config.orchestrator);
        Self::with_components(config, sources, processors)
    }

    /// 使用给定的数据源和阶段处理器构造
    pub fn with_components(
        config: AppConfig,
        sources: SourceRegistry,
        processors: ProcessorRegistry,
    ) -> Result<Self> {
        config.validate().context("应用配置无效")?;
        info!("初始化应用上下文，数据源: {:?}", sources.ids());

        let metrics = Arc::new(MetricsCollector::new());
        let event_bus = Arc::new(EventBus::new(
            config.event_bus.clone(),
            Arc::clone(&metrics),
        ));

        let timeout_handler = TimeoutHandler::new(TimeoutConfig::with_source_timeout(
            Duration::from_secs(config.collector.source_timeout_seconds),
        ));
        let collector = Arc::new(MultiSourceCollector::new(
            sources,
            timeout_handler,
            Arc::clone(&metrics),
        ));
        let validator = QualityValidator::new(config.quality.clone());

        let publisher: Arc<dyn EventPublisher> = event_bus.clone();
        let scheduler = Arc::new(DataCollectionScheduler::new(
            config.scheduler.clone(),
            config.collector.clone(),
            collector,
            validator,
            publisher,
            Arc::clone(&metrics),
        ));

        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            &config.orchestrator,
            processors,
            Arc::clone(&event_bus),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            metrics,
            event_bus,
            scheduler,
            orchestrator,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn scheduler(&self) -> Arc<DataCollectionScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn orchestrator(&self) -> Arc<WorkflowOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// 注册配置文件中声明的调度，返回成功注册的数量
    ///
    /// 单个调度注册失败只记录日志，不影响其他调度。
    pub async fn register_configured_schedules(&self) -> usize {
        let mut registered = 0;
        for definition in &self.config.schedules {
            let result = match definition.location() {
                Ok(location) => {
                    self.scheduler
                        .add_schedule(
                            &definition.name,
                            &definition.source,
                            location,
                            definition.data_type,
                            definition.frequency_minutes,
                        )
                        .await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(_) => registered += 1,
                Err(e) => error!("注册调度 {} 失败: {}", definition.name, e),
            }
        }
        info!(
            "已注册 {}/{} 个配置调度",
            registered,
            self.config.schedules.len()
        );
        registered
    }

    /// 按模式运行组件，直到收到关闭信号
    pub async fn run(&self, mode: AppMode, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用，模式: {:?}", mode);
        let mut handles = Vec::new();

        if matches!(mode, AppMode::Scheduler | AppMode::All) {
            if self.config.scheduler.enabled {
                self.register_configured_schedules().await;
                let scheduler = Arc::clone(&self.scheduler);
                let rx = shutdown_rx.resubscribe();
                handles.push(tokio::spawn(async move { scheduler.run(rx).await }));
            } else {
                warn!("采集调度已在配置中禁用");
            }
        }

        if matches!(mode, AppMode::Orchestrator | AppMode::All) {
            let orchestrator = Arc::clone(&self.orchestrator);
            let interval = Duration::from_secs(self.config.event_bus.processing_interval_seconds);
            let rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(
                async move { orchestrator.run(interval, rx).await },
            ));
        }

        if handles.is_empty() {
            warn!("没有需要运行的组件");
            return Ok(());
        }

        for result in futures::future::join_all(handles).await {
            result.context("组件任务异常退出")?;
        }

        info!("应用已停止");
        Ok(())
    }
}

/// 配置了API密钥时注册 OpenWeather 数据源
fn default_sources(config: &AppConfig) -> SourceRegistry {
    let mut sources = SourceRegistry::new();
    match config.collector.openweather_api_key.as_deref() {
        Some(key) if !key.is_empty() => {
            sources.register(Arc::new(OpenWeatherSource::new(
                &config.collector.openweather_base_url,
                key,
            )));
        }
        _ => warn!("未配置 OpenWeather API 密钥，采集将没有可用数据源"),
    }
    sources
}
