pub mod config;
pub mod errors;
pub mod fs_utils;
pub mod models;
pub mod traits;

pub use config::{
    AppConfig, BrokerConfig, BrokerType, ConsumerConfig, ControlFileConfig, ObservabilityConfig,
    ProducerConfig, QueueBinding,
};
pub use errors::*;
pub use models::{DataFile, DataFileKind, Delivery, Event, OutboundMessage, FILENAME_HEADER};
pub use traits::{Acknowledger, DeliveryStream, MessageBroker};
