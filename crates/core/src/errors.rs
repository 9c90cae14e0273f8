use std::path::PathBuf;

use thiserror::Error;

/// 文件中继系统错误类型定义
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("消息队列连接失败: {0}")]
    Connection(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("文件操作失败 {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("模板渲染失败: {0}")]
    Template(String),

    #[error("无效的消息: {0}")]
    InvalidDelivery(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("通道已关闭: {0}")]
    ChannelClosed(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type RelayResult<T> = std::result::Result<T, RelayError>;

impl RelayError {
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn file_system<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// 致命错误会终止进程，而不是记录后继续
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::Configuration(_)
                | RelayError::Connection(_)
                | RelayError::ChannelClosed(_)
                | RelayError::Internal(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::MessageQueue(_) | RelayError::Timeout(_) | RelayError::FileSystem { .. }
        )
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Configuration(err.to_string())
    }
}

impl From<anyhow::Error> for RelayError {
    fn from(err: anyhow::Error) -> Self {
        RelayError::Internal(err.to_string())
    }
}
