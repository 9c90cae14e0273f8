pub mod app_config;
pub mod broker;
pub mod observability;
pub mod pipeline;

pub use app_config::{AppConfig, ENV_PREFIX};
pub use broker::{BrokerConfig, BrokerType};
pub use observability::ObservabilityConfig;
pub use pipeline::{ConsumerConfig, ControlFileConfig, ProducerConfig, QueueBinding};
