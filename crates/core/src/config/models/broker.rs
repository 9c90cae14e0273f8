use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::RelayResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerType {
    Rabbitmq,
    InMemory,
}

/// 消息代理连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub r#type: BrokerType,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub publish_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub connection_timeout_seconds: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            r#type: BrokerType::Rabbitmq,
            user: "guest".to_string(),
            password: "guest".to_string(),
            host: "localhost".to_string(),
            port: 5672,
            vhost: "/".to_string(),
            publish_timeout_seconds: 5,
            max_retries: 3,
            retry_delay_seconds: 5,
            connection_timeout_seconds: 30,
        }
    }
}

impl BrokerConfig {
    pub fn in_memory_default() -> Self {
        Self {
            r#type: BrokerType::InMemory,
            retry_delay_seconds: 1,
            connection_timeout_seconds: 1,
            ..Self::default()
        }
    }

    /// 不含凭据的地址，用于日志
    pub fn display_address(&self) -> String {
        format!("{}:{}{}", self.host, self.port, self.vhost)
    }
}

impl ConfigValidator for BrokerConfig {
    fn validate(&self) -> RelayResult<()> {
        if self.r#type == BrokerType::Rabbitmq {
            ValidationUtils::validate_not_empty(&self.host, "broker.host")?;
            ValidationUtils::validate_not_empty(&self.user, "broker.user")?;
            ValidationUtils::validate_port(self.port)?;
        }

        ValidationUtils::validate_timeout(
            self.publish_timeout_seconds,
            "broker.publish_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout(self.retry_delay_seconds, "broker.retry_delay_seconds")?;
        ValidationUtils::validate_timeout(
            self.connection_timeout_seconds,
            "broker.connection_timeout_seconds",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_config_default() {
        let config = BrokerConfig::default();
        assert_eq!(config.r#type, BrokerType::Rabbitmq);
        assert_eq!(config.port, 5672);
        assert_eq!(config.publish_timeout_seconds, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_broker_config_validation() {
        let config = BrokerConfig {
            host: String::new(),
            ..BrokerConfig::default()
        };
        assert!(config.validate().is_err());

        // 内存代理不需要连接信息
        let config = BrokerConfig {
            host: String::new(),
            ..BrokerConfig::in_memory_default()
        };
        assert!(config.validate().is_ok());

        let config = BrokerConfig {
            publish_timeout_seconds: 0,
            ..BrokerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retries_allowed() {
        // 首次发布失败即退出
        let config = BrokerConfig {
            max_retries: 0,
            ..BrokerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_display_address_hides_credentials() {
        let config = BrokerConfig {
            password: "s3cret".to_string(),
            ..BrokerConfig::default()
        };
        assert_eq!(config.display_address(), "localhost:5672/");
        assert!(!config.display_address().contains("s3cret"));
    }
}
