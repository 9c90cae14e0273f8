use std::sync::Arc;

use anyhow::{Context, Result};
use relay_consumer::ConsumerService;
use relay_core::{AppConfig, MessageBroker, RelayResult};
use relay_infrastructure::BrokerFactory;
use relay_producer::{BatchAccumulator, ControlFileGenerator, Producer, PublishPolicy, Publisher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行生产端（扫描 + 发布）
    Producer,
    /// 仅运行消费端
    Consumer,
    /// 同一进程内运行两端
    All,
}

impl AppMode {
    pub fn runs_producer(self) -> bool {
        matches!(self, AppMode::Producer | AppMode::All)
    }

    pub fn runs_consumer(self) -> bool {
        matches!(self, AppMode::Consumer | AppMode::All)
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    broker: Arc<dyn MessageBroker>,
}

impl Application {
    /// 校验当前模式需要的配置并连接消息代理
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);
        validate_mode_config(&config, mode)?;

        let broker = BrokerFactory::create(&config.broker)
            .await
            .with_context(|| format!("连接消息代理失败: {}", config.broker.display_address()))?;

        Ok(Self {
            config,
            mode,
            broker,
        })
    }

    /// 使用已创建的消息代理
    pub fn with_broker(config: AppConfig, mode: AppMode, broker: Arc<dyn MessageBroker>) -> Result<Self> {
        validate_mode_config(&config, mode)?;
        Ok(Self {
            config,
            mode,
            broker,
        })
    }

    /// 运行应用程序，直到收到关闭信号或任一组件失败
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        let mut tasks: JoinSet<(&'static str, RelayResult<()>)> = JoinSet::new();

        if self.mode.runs_producer() {
            self.spawn_producer(&mut tasks, &shutdown_rx).await?;
        }
        if self.mode.runs_consumer() {
            let service = ConsumerService::new(
                Arc::clone(&self.broker),
                &self.config.consumer,
                &self.config.control_file,
            );
            let shutdown_rx = shutdown_rx.resubscribe();
            tasks.spawn(async move { ("消费端", service.run(shutdown_rx).await) });
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!("{} 已停止", name),
                Ok((name, Err(e))) => {
                    error!("{} 运行失败: {}", name, e);
                    failure = Some(anyhow::Error::new(e).context(format!("{name} 运行失败")));
                    tasks.abort_all();
                    break;
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    failure = Some(anyhow::anyhow!("组件任务异常退出: {e}"));
                    tasks.abort_all();
                    break;
                }
            }
        }

        if let Err(e) = self.broker.close().await {
            warn!("关闭消息代理失败: {}", e);
        }

        match failure {
            Some(e) => Err(e),
            None => {
                info!("应用程序已停止");
                Ok(())
            }
        }
    }

    /// 扫描任务和发布任务通过有界队列连接；扫描任务退出后发布任务处理完剩余批次再退出
    async fn spawn_producer(
        &self,
        tasks: &mut JoinSet<(&'static str, RelayResult<()>)>,
        shutdown_rx: &broadcast::Receiver<()>,
    ) -> Result<()> {
        let publisher = Publisher::new(
            Arc::clone(&self.broker),
            self.config.producer.publish_queues.clone(),
            PublishPolicy::from_config(&self.config.broker),
        );
        publisher.declare_queues().await.context("声明发布队列失败")?;

        let generator = Arc::new(ControlFileGenerator::new(&self.config.control_file));
        let accumulator = BatchAccumulator::new(self.config.producer.batch_size, generator)?;
        let (event_tx, event_rx) = mpsc::channel(self.config.producer.event_queue_capacity);
        let producer = Producer::new(&self.config.producer, accumulator, event_tx);

        let shutdown_rx = shutdown_rx.resubscribe();
        tasks.spawn(async move { ("目录扫描", producer.run(shutdown_rx).await) });
        tasks.spawn(async move { ("发布者", publisher.run(event_rx).await) });
        Ok(())
    }
}

/// 按运行模式校验配置
pub fn validate_mode_config(config: &AppConfig, mode: AppMode) -> Result<()> {
    config.validate()?;
    if mode.runs_producer() {
        config.validate_producer()?;
    }
    if mode.runs_consumer() {
        config.validate_consumer()?;
    }
    Ok(())
}
