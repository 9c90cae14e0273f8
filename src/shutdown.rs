use tokio::sync::broadcast;
use tracing::{debug, info};

/// 关闭信号广播：生产端扫描循环、发布任务和各队列消费任务各持有一个接收器
pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    /// 订阅关闭信号，须在 [`ShutdownManager::shutdown`] 之前调用
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// 通知所有订阅者停止
    pub fn shutdown(&self) {
        info!("触发系统关闭");
        // 没有接收者时发送失败，忽略
        if let Ok(receivers) = self.shutdown_tx.send(()) {
            debug!("关闭信号已发送给 {} 个订阅者", receivers);
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_shutdown() {
        let manager = ShutdownManager::new();
        let mut rx1 = manager.subscribe();
        let rx2 = manager.subscribe();
        // 各个消费任务通过resubscribe拿到自己的接收器
        let mut rx3 = rx2.resubscribe();

        manager.shutdown();

        assert!(timeout(Duration::from_millis(100), rx1.recv()).await.is_ok());
        assert!(timeout(Duration::from_millis(100), rx3.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_without_subscribers_is_harmless() {
        let manager = ShutdownManager::new();
        manager.shutdown();

        let mut rx = manager.subscribe();
        manager.shutdown();
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_ok());
    }
}
