use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::traits::Acknowledger;
use crate::{DataFile, RelayResult};

/// 消息头中携带文件名的字段
pub const FILENAME_HEADER: &str = "filename";

/// 待发布的消息
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub headers: HashMap<String, Value>,
    pub content_type: String,
}

impl OutboundMessage {
    /// 每个文件一条消息，文件名放在消息头
    pub fn from_data_file(file: &DataFile) -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            FILENAME_HEADER.to_string(),
            Value::String(file.name.clone()),
        );
        Self {
            body: file.content.clone(),
            headers,
            content_type: "text/plain".to_string(),
        }
    }

    pub fn filename(&self) -> Option<&str> {
        self.headers.get(FILENAME_HEADER).and_then(Value::as_str)
    }
}

/// 消费者收到的一条投递
///
/// `ack` 和 `nack` 会消耗投递本身，因此每条投递只能被确认一次。
pub struct Delivery {
    pub queue: String,
    pub body: Vec<u8>,
    pub headers: HashMap<String, Value>,
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        queue: impl Into<String>,
        body: Vec<u8>,
        headers: HashMap<String, Value>,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            queue: queue.into(),
            body,
            headers,
            redelivered: false,
            acker,
        }
    }

    pub fn with_redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }

    /// 文件名字段缺失或不是字符串时返回None
    pub fn filename(&self) -> Option<&str> {
        self.headers.get(FILENAME_HEADER).and_then(Value::as_str)
    }

    pub async fn ack(self) -> RelayResult<()> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> RelayResult<()> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("queue", &self.queue)
            .field("filename", &self.filename())
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_message_carries_filename() {
        let file = DataFile::new("a.dat", "hello");
        let message = OutboundMessage::from_data_file(&file);

        assert_eq!(message.filename(), Some("a.dat"));
        assert_eq!(message.body, b"hello".to_vec());
        assert_eq!(message.content_type, "text/plain");
    }
}
