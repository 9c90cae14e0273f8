pub mod data_file;
pub mod message;

pub use data_file::{DataFile, DataFileKind, Event};
pub use message::{Delivery, OutboundMessage, FILENAME_HEADER};
