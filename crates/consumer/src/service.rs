use std::sync::Arc;

use relay_core::{ConsumerConfig, ControlFileConfig, MessageBroker, RelayError, RelayResult};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::process_list::ProcessList;
use crate::router::QueueRouter;

/// 消费端服务：每个队列绑定一个独立的消费任务，共享同一个处理清单
pub struct ConsumerService {
    broker: Arc<dyn MessageBroker>,
    routers: Vec<Arc<QueueRouter>>,
    process_list: Arc<ProcessList>,
}

impl ConsumerService {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        config: &ConsumerConfig,
        control_file: &ControlFileConfig,
    ) -> Self {
        let process_list = Arc::new(ProcessList::new(&config.process_list));
        let routers = config
            .bindings
            .iter()
            .map(|binding| {
                Arc::new(QueueRouter::new(
                    binding,
                    control_file,
                    Arc::clone(&process_list),
                ))
            })
            .collect();

        Self {
            broker,
            routers,
            process_list,
        }
    }

    pub fn queues(&self) -> Vec<&str> {
        self.routers.iter().map(|r| r.queue()).collect()
    }

    /// 运行所有队列的消费任务
    ///
    /// 任一任务出错时停止其余任务并返回该错误。
    pub async fn run(self, shutdown_rx: broadcast::Receiver<()>) -> RelayResult<()> {
        info!(queues = ?self.queues(), process_list = %self.process_list.path().display(), "启动消费端");

        let mut tasks = JoinSet::new();
        for router in &self.routers {
            let router = Arc::clone(router);
            let broker = Arc::clone(&self.broker);
            let shutdown_rx = shutdown_rx.resubscribe();
            tasks.spawn(async move { router.run(broker, shutdown_rx).await });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| RelayError::Internal(format!("消费任务异常退出: {e}")))
                .and_then(|r| r);
            if let Err(e) = result {
                error!("消费任务失败: {}", e);
                tasks.abort_all();
                return Err(e);
            }
        }

        info!("消费端已停止");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use relay_core::QueueBinding;

    use super::*;

    #[test]
    fn test_one_router_per_binding() {
        let config = ConsumerConfig {
            process_list: PathBuf::from("/tmp/process_list.txt"),
            bindings: vec![
                QueueBinding::new("starlight", "/out/starlight"),
                QueueBinding::new("ppfx", "/out/ppfx"),
            ],
        };
        let broker: Arc<dyn MessageBroker> = Arc::new(NullBroker);
        let service = ConsumerService::new(broker, &config, &ControlFileConfig::default());

        assert_eq!(service.queues(), vec!["starlight", "ppfx"]);
        assert_eq!(
            service.process_list.path(),
            PathBuf::from("/tmp/process_list.txt").as_path()
        );
    }

    #[tokio::test]
    async fn test_consume_failure_stops_service() {
        let config = ConsumerConfig {
            process_list: PathBuf::from("/tmp/process_list.txt"),
            bindings: vec![QueueBinding::new("starlight", "/out/starlight")],
        };
        let service =
            ConsumerService::new(Arc::new(NullBroker), &config, &ControlFileConfig::default());
        let (_tx, rx) = broadcast::channel(1);

        let err = service.run(rx).await.unwrap_err();
        assert!(err.is_fatal());
    }

    /// 无法消费的代理
    struct NullBroker;

    #[async_trait::async_trait]
    impl MessageBroker for NullBroker {
        async fn declare_queue(&self, _queue: &str) -> RelayResult<()> {
            Ok(())
        }

        async fn publish(
            &self,
            _queue: &str,
            _message: &relay_core::OutboundMessage,
        ) -> RelayResult<()> {
            Ok(())
        }

        async fn consume(
            &self,
            queue: &str,
            _consumer_tag: &str,
        ) -> RelayResult<relay_core::DeliveryStream> {
            Err(RelayError::MessageQueue(format!("queue {queue} unavailable")))
        }

        async fn close(&self) -> RelayResult<()> {
            Ok(())
        }
    }
}
