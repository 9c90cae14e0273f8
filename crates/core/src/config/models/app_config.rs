use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{
    broker::BrokerConfig,
    observability::ObservabilityConfig,
    pipeline::{ConsumerConfig, ControlFileConfig, ProducerConfig},
};
use crate::config::validation::ConfigValidator;
use crate::{RelayError, RelayResult};

/// 环境变量前缀，例如 `RELAY__PRODUCER__BATCH_SIZE`
pub const ENV_PREFIX: &str = "RELAY";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub producer: ProducerConfig,
    pub control_file: ControlFileConfig,
    pub consumer: ConsumerConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: RELAY__, separator: __)
    /// 4. Legacy deployment variables (RABBITMQ_HOST, INPUT_DIR, BATCH_SIZE, ...)
    ///
    /// Only section-independent checks run here; each run mode validates its own
    /// sections with [`AppConfig::validate_producer`] / [`AppConfig::validate_consumer`].
    pub fn load(config_path: Option<&str>) -> RelayResult<Self> {
        let mut builder =
            ConfigBuilder::builder().add_source(ConfigBuilder::try_from(&AppConfig::default())?);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(RelayError::config_error(format!("配置文件不存在: {path}")));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("producer.publish_queues")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()
            .map_err(|e| RelayError::config_error(format!("构建配置失败: {e}")))?
            .try_deserialize()
            .map_err(|e| RelayError::config_error(format!("反序列化配置失败: {e}")))?;

        config.apply_legacy_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// 兼容旧部署使用的环境变量，存在时覆盖已加载的值
    pub fn apply_legacy_env<F>(&mut self, lookup: F) -> RelayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(user) = non_empty("RABBITMQ_USER") {
            self.broker.user = user;
        }
        if let Some(password) = non_empty("RABBITMQ_PASSWORD") {
            self.broker.password = password;
        }
        if let Some(host) = non_empty("RABBITMQ_HOST") {
            self.broker.host = host;
        }
        if let Some(port) = non_empty("RABBITMQ_PORT") {
            self.broker.port = port.trim().parse().map_err(|_| {
                RelayError::config_error(format!("RABBITMQ_PORT不是有效端口: {port}"))
            })?;
        }
        if let Some(input_dir) = non_empty("INPUT_DIR") {
            self.producer.input_dir = PathBuf::from(input_dir);
        }
        if let Some(archive_dir) = non_empty("OUTPUT_DIR") {
            self.producer.archive_dir = PathBuf::from(archive_dir);
        }
        if let Some(batch_size) = non_empty("BATCH_SIZE") {
            self.producer.batch_size = batch_size.trim().parse().map_err(|_| {
                RelayError::config_error(format!("BATCH_SIZE不是有效整数: {batch_size}"))
            })?;
        }
        if let Some(process_list) = non_empty("PROCESS_LIST") {
            self.consumer.process_list = PathBuf::from(process_list);
        }

        for binding in &mut self.consumer.bindings {
            if binding.resolved_output_dir().is_some() {
                continue;
            }
            let key = format!("OUTPUT_DIR_{}", binding.queue.to_uppercase());
            if let Some(dir) = non_empty(&key) {
                binding.output_dir = PathBuf::from(dir);
            }
        }

        Ok(())
    }

    /// Validate configuration sections shared by every run mode
    pub fn validate(&self) -> RelayResult<()> {
        self.broker
            .validate()
            .map_err(|e| RelayError::config_error(format!("消息代理配置验证失败: {e}")))?;
        self.observability
            .validate()
            .map_err(|e| RelayError::config_error(format!("日志配置验证失败: {e}")))?;
        Ok(())
    }

    /// 生产端启动前的校验
    pub fn validate_producer(&self) -> RelayResult<()> {
        self.producer
            .validate()
            .map_err(|e| RelayError::config_error(format!("生产端配置验证失败: {e}")))?;
        self.control_file
            .validate()
            .map_err(|e| RelayError::config_error(format!("控制文件配置验证失败: {e}")))?;
        Ok(())
    }

    /// 消费端启动前的校验
    pub fn validate_consumer(&self) -> RelayResult<()> {
        self.consumer
            .validate()
            .map_err(|e| RelayError::config_error(format!("消费端配置验证失败: {e}")))?;
        self.control_file
            .validate()
            .map_err(|e| RelayError::config_error(format!("控制文件配置验证失败: {e}")))?;
        Ok(())
    }
}
