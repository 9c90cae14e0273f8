use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{Delivery, OutboundMessage, RelayResult};

/// 消费端收到的投递流
pub type DeliveryStream = BoxStream<'static, RelayResult<Delivery>>;

/// 单条投递的确认接口
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// 确认消息处理完成
    async fn ack(&self) -> RelayResult<()>;

    /// 拒绝消息，requeue为true时重新入队
    async fn nack(&self, requeue: bool) -> RelayResult<()>;
}

/// 消息代理抽象接口
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// 声明持久化队列
    async fn declare_queue(&self, queue: &str) -> RelayResult<()>;

    /// 发布消息到指定队列，返回时消息已交给代理
    async fn publish(&self, queue: &str, message: &OutboundMessage) -> RelayResult<()>;

    /// 以手动确认、prefetch=1的方式消费队列
    async fn consume(&self, queue: &str, consumer_tag: &str) -> RelayResult<DeliveryStream>;

    /// 关闭连接
    async fn close(&self) -> RelayResult<()>;
}
