pub mod message_broker;

pub use message_broker::{Acknowledger, DeliveryStream, MessageBroker};
