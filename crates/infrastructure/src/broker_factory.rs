use std::sync::Arc;

use relay_core::{BrokerConfig, BrokerType, MessageBroker, RelayResult};
use tracing::{debug, info};

use crate::{InMemoryBroker, RabbitMqBroker};

pub struct BrokerFactory;

impl BrokerFactory {
    pub async fn create(config: &BrokerConfig) -> RelayResult<Arc<dyn MessageBroker>> {
        debug!("Creating message broker with type: {:?}", config.r#type);

        match config.r#type {
            BrokerType::Rabbitmq => {
                info!("Initializing RabbitMQ message broker");
                let rabbitmq = RabbitMqBroker::connect(config).await?;
                Ok(Arc::new(rabbitmq))
            }
            BrokerType::InMemory => {
                info!("Initializing in-memory message broker");
                Ok(Arc::new(InMemoryBroker::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_broker() {
        let broker = BrokerFactory::create(&BrokerConfig::in_memory_default())
            .await
            .unwrap();
        broker.declare_queue("starlight").await.unwrap();
        broker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_rabbitmq_broker_unreachable() {
        let config = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connection_timeout_seconds: 2,
            ..BrokerConfig::default()
        };
        let result = BrokerFactory::create(&config).await;
        let err = result.err().expect("连接不存在的端口应当失败");
        assert!(err.is_fatal());
    }
}
