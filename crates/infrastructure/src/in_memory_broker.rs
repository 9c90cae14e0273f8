use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use relay_core::{
    Acknowledger, Delivery, DeliveryStream, MessageBroker, OutboundMessage, RelayError,
    RelayResult,
};
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, info};

/// 内存消息代理实现
///
/// 使用 Tokio channels 模拟持久队列，适用于单进程部署和测试。
/// 每个消费者同一时间最多持有一条未确认消息；nack(requeue) 和未确认即丢弃的投递
/// 都会把消息放回队尾。
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    /// 队列存储：队列名 -> 通道
    queues: RwLock<HashMap<String, QueueChannels>>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message: OutboundMessage,
    redelivered: bool,
}

#[derive(Debug, Clone)]
struct QueueChannels {
    sender: mpsc::UnboundedSender<StoredMessage>,
    /// 多个消费者共享同一个接收端
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<StoredMessage>>>,
    counters: Arc<QueueCounters>,
}

#[derive(Debug, Default)]
struct QueueCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
    requeued: AtomicU64,
}

impl QueueCounters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
        }
    }
}

/// 队列统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
    pub requeued: u64,
}

impl InMemoryBroker {
    /// 创建新的内存消息代理
    pub fn new() -> Self {
        info!("Creating in-memory message broker");
        Self::default()
    }

    async fn channels(&self, queue: &str) -> RelayResult<QueueChannels> {
        self.queues
            .read()
            .await
            .get(queue)
            .cloned()
            .ok_or_else(|| RelayError::MessageQueue(format!("队列 {queue} 未声明")))
    }

    /// 获取队列统计信息
    pub async fn queue_stats(&self, queue: &str) -> Option<QueueStats> {
        let queues = self.queues.read().await;
        queues.get(queue).map(|channels| channels.counters.snapshot())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_queue(&self, queue: &str) -> RelayResult<()> {
        let mut queues = self.queues.write().await;
        queues.entry(queue.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            debug!(queue, "内存队列已创建");
            QueueChannels {
                sender,
                receiver: Arc::new(Mutex::new(receiver)),
                counters: Arc::new(QueueCounters::default()),
            }
        });
        Ok(())
    }

    async fn publish(&self, queue: &str, message: &OutboundMessage) -> RelayResult<()> {
        let channels = self.channels(queue).await?;
        channels
            .sender
            .send(StoredMessage {
                message: message.clone(),
                redelivered: false,
            })
            .map_err(|_| RelayError::MessageQueue(format!("队列 {queue} 已关闭")))?;
        channels.counters.published.fetch_add(1, Ordering::Relaxed);
        debug!(queue, filename = ?message.filename(), "消息已发布到内存队列");
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> RelayResult<DeliveryStream> {
        let channels = self.channels(queue).await?;
        let prefetch = Arc::new(Semaphore::new(1));
        let queue_name = queue.to_string();
        debug!(queue, consumer_tag, "内存队列消费者已注册");

        let stream = futures::stream::unfold(
            (channels, prefetch, queue_name),
            |(channels, prefetch, queue_name)| async move {
                // 上一条投递确认前不会取下一条
                let permit = Arc::clone(&prefetch).acquire_owned().await.ok()?;
                let stored = channels.receiver.lock().await.recv().await?;
                channels.counters.delivered.fetch_add(1, Ordering::Relaxed);

                let acker = InMemoryAcknowledger {
                    stored: stored.clone(),
                    sender: channels.sender.clone(),
                    counters: Arc::clone(&channels.counters),
                    settled: AtomicBool::new(false),
                    permit: std::sync::Mutex::new(Some(permit)),
                };
                let delivery = Delivery::new(
                    queue_name.clone(),
                    stored.message.body,
                    stored.message.headers,
                    Box::new(acker),
                )
                .with_redelivered(stored.redelivered);

                Some((
                    Ok::<_, RelayError>(delivery),
                    (channels, prefetch, queue_name),
                ))
            },
        );

        Ok(stream.boxed())
    }

    async fn close(&self) -> RelayResult<()> {
        for (queue, channels) in self.queues.read().await.iter() {
            let stats = channels.counters.snapshot();
            info!(
                queue = %queue,
                published = stats.published,
                acked = stats.acked,
                requeued = stats.requeued,
                "内存队列统计"
            );
        }
        info!("内存消息代理已关闭");
        Ok(())
    }
}

struct InMemoryAcknowledger {
    stored: StoredMessage,
    sender: mpsc::UnboundedSender<StoredMessage>,
    counters: Arc<QueueCounters>,
    settled: AtomicBool,
    permit: std::sync::Mutex<Option<OwnedSemaphorePermit>>,
}

impl InMemoryAcknowledger {
    fn release(&self) {
        if let Ok(mut permit) = self.permit.lock() {
            permit.take();
        }
    }

    fn requeue(&self) -> RelayResult<()> {
        let mut stored = self.stored.clone();
        stored.redelivered = true;
        self.sender
            .send(stored)
            .map_err(|_| RelayError::MessageQueue("重新入队失败: 队列已关闭".to_string()))?;
        self.counters.requeued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn settle(&self) -> RelayResult<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(RelayError::MessageQueue("消息已被确认过".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for InMemoryAcknowledger {
    async fn ack(&self) -> RelayResult<()> {
        self.settle()?;
        self.counters.acked.fetch_add(1, Ordering::Relaxed);
        self.release();
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> RelayResult<()> {
        self.settle()?;
        self.counters.nacked.fetch_add(1, Ordering::Relaxed);
        let result = if requeue { self.requeue() } else { Ok(()) };
        self.release();
        result
    }
}

impl Drop for InMemoryAcknowledger {
    fn drop(&mut self) {
        // 与通道关闭时RabbitMQ的行为一致：未确认的消息重新入队
        if !self.settled.load(Ordering::SeqCst) {
            let _ = self.requeue();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relay_core::DataFile;

    use super::*;

    #[tokio::test]
    async fn test_publish_requires_declared_queue() {
        let broker = InMemoryBroker::new();
        let message = OutboundMessage::from_data_file(&DataFile::new("a.dat", "hello"));
        assert!(broker.publish("missing", &message).await.is_err());
    }

    #[tokio::test]
    async fn test_publish_and_ack() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("starlight").await.unwrap();
        let message = OutboundMessage::from_data_file(&DataFile::new("a.dat", "hello"));
        broker.publish("starlight", &message).await.unwrap();

        let mut stream = broker.consume("starlight", "test").await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.filename(), Some("a.dat"));
        assert_eq!(delivery.body, b"hello".to_vec());
        assert!(!delivery.redelivered);
        delivery.ack().await.unwrap();

        let stats = broker.queue_stats("starlight").await.unwrap();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.acked, 1);
        assert_eq!(stats.requeued, 0);
    }

    #[tokio::test]
    async fn test_nack_requeue_redelivers() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("ppfx").await.unwrap();
        let message = OutboundMessage::from_data_file(&DataFile::new("b.dat", "data"));
        broker.publish("ppfx", &message).await.unwrap();

        let mut stream = broker.consume("ppfx", "test").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        first.nack(true).await.unwrap();

        let second = stream.next().await.unwrap().unwrap();
        assert!(second.redelivered);
        assert_eq!(second.filename(), Some("b.dat"));
        second.ack().await.unwrap();

        let stats = broker.queue_stats("ppfx").await.unwrap();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.nacked, 1);
        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.acked, 1);
    }

    #[tokio::test]
    async fn test_prefetch_one_blocks_until_settled() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("steckmap").await.unwrap();
        for name in ["a.dat", "b.dat"] {
            let message = OutboundMessage::from_data_file(&DataFile::new(name, "x"));
            broker.publish("steckmap", &message).await.unwrap();
        }

        let mut stream = broker.consume("steckmap", "test").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();

        // 第一条未确认时拿不到第二条
        let pending = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(pending.is_err());

        first.ack().await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.filename(), Some("b.dat"));
        second.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_delivery_is_requeued() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("starlight").await.unwrap();
        let message = OutboundMessage::from_data_file(&DataFile::new("c.dat", "x"));
        broker.publish("starlight", &message).await.unwrap();

        let mut stream = broker.consume("starlight", "test").await.unwrap();
        drop(stream.next().await.unwrap().unwrap());

        let redelivered = stream.next().await.unwrap().unwrap();
        assert!(redelivered.redelivered);
        redelivered.ack().await.unwrap();
    }
}
