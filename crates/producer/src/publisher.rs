use std::sync::Arc;
use std::time::Duration;

use relay_core::{BrokerConfig, Event, MessageBroker, OutboundMessage, RelayError, RelayResult};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// 批次发布策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPolicy {
    /// 整个批次（所有文件、所有队列）共用的超时
    pub timeout: Duration,
    /// 首次失败后的重试次数
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl PublishPolicy {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.publish_timeout_seconds),
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
        }
    }
}

/// 发布者：按到达顺序逐个发布批次，每个文件一条消息
pub struct Publisher {
    broker: Arc<dyn MessageBroker>,
    queues: Vec<String>,
    policy: PublishPolicy,
}

impl Publisher {
    pub fn new(broker: Arc<dyn MessageBroker>, queues: Vec<String>, policy: PublishPolicy) -> Self {
        Self {
            broker,
            queues,
            policy,
        }
    }

    /// 声明所有目标队列
    pub async fn declare_queues(&self) -> RelayResult<()> {
        for queue in &self.queues {
            self.broker.declare_queue(queue).await?;
        }
        Ok(())
    }

    /// 发布一个批次；超时覆盖整个批次
    pub async fn publish_event(&self, event: &Event) -> RelayResult<()> {
        let publish_all = async {
            for file in &event.files {
                let message = OutboundMessage::from_data_file(file);
                for queue in &self.queues {
                    self.broker.publish(queue, &message).await?;
                }
            }
            Ok::<_, RelayError>(())
        };

        tokio::time::timeout(self.policy.timeout, publish_all)
            .await
            .map_err(|_| {
                RelayError::Timeout(format!(
                    "发布批次超时（{}ms）",
                    self.policy.timeout.as_millis()
                ))
            })?
    }

    /// 失败后整批重试；重试耗尽或遇到不可重试的错误时返回致命错误，进程随之退出
    ///
    /// 重试时整批重新发布，已成功的消息可能重复投递。
    pub async fn publish_with_retry(&self, event: &Event) -> RelayResult<()> {
        let mut attempt = 0;
        loop {
            match self.publish_event(event).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.policy.max_retries,
                        error = %e,
                        "发布批次失败，稍后重试"
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                Err(e) => {
                    return Err(RelayError::Internal(format!(
                        "发布批次失败，已重试{attempt}次: {e}"
                    )));
                }
            }
        }
    }

    /// 消费事件队列直到生产端关闭发送端
    pub async fn run(self, mut event_rx: mpsc::Receiver<Event>) -> RelayResult<()> {
        info!(queues = ?self.queues, "发布者已启动");

        while let Some(event) = event_rx.recv().await {
            if let Err(e) = self.publish_with_retry(&event).await {
                error!("{}", e);
                return Err(e);
            }
            info!(
                files = event.len(),
                primary = event.files.first().map(|f| f.name.as_str()).unwrap_or_default(),
                "批次已发布"
            );
        }

        info!("事件队列已关闭，发布者退出");
        Ok(())
    }
}
