//! 消费端：按队列把文件写到输出目录，控制文件登记到处理清单

pub mod process_list;
pub mod router;
pub mod service;

pub use process_list::ProcessList;
pub use router::{DeliveryOutcome, QueueRouter};
pub use service::ConsumerService;
