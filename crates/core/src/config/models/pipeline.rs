use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::{RelayError, RelayResult};

/// 生产端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub input_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub batch_size: usize,
    pub poll_interval_seconds: u64,
    pub event_queue_capacity: usize,
    pub publish_queues: Vec<String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::new(),
            archive_dir: PathBuf::new(),
            batch_size: 0,
            poll_interval_seconds: 10,
            event_queue_capacity: 10,
            publish_queues: vec!["starlight".to_string()],
        }
    }
}

impl ConfigValidator for ProducerConfig {
    fn validate(&self) -> RelayResult<()> {
        ValidationUtils::validate_path(&self.input_dir, "producer.input_dir")?;
        ValidationUtils::validate_path(&self.archive_dir, "producer.archive_dir")?;
        ValidationUtils::validate_count(self.batch_size, "producer.batch_size", 100_000)?;
        ValidationUtils::validate_timeout(
            self.poll_interval_seconds,
            "producer.poll_interval_seconds",
        )?;
        ValidationUtils::validate_count(
            self.event_queue_capacity,
            "producer.event_queue_capacity",
            10_000,
        )?;

        if self.publish_queues.is_empty() {
            return Err(RelayError::config_error(
                "producer.publish_queues must contain at least one queue",
            ));
        }
        for queue in &self.publish_queues {
            ValidationUtils::validate_not_empty(queue, "producer.publish_queues")?;
        }

        if self.input_dir == self.archive_dir {
            return Err(RelayError::config_error(
                "producer.archive_dir must differ from producer.input_dir",
            ));
        }

        Ok(())
    }
}

/// 控制文件（.in）模板配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFileConfig {
    pub template_path: PathBuf,
    pub output_dir: PathBuf,
    /// 需要改写的模板行，从1开始计数
    pub line_number: usize,
    pub extension: String,
}

impl Default for ControlFileConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("/docker/starlight/config_files_starlight/grid_example.in"),
            output_dir: PathBuf::from("/starlight/runtime/infiles"),
            line_number: 16,
            extension: ".in".to_string(),
        }
    }
}

impl ControlFileConfig {
    /// 判断文件名是否为控制文件
    pub fn is_control_artifact(&self, filename: &str) -> bool {
        filename.ends_with(&self.extension)
    }
}

impl ConfigValidator for ControlFileConfig {
    fn validate(&self) -> RelayResult<()> {
        ValidationUtils::validate_path(&self.template_path, "control_file.template_path")?;
        ValidationUtils::validate_path(&self.output_dir, "control_file.output_dir")?;
        ValidationUtils::validate_not_empty(&self.extension, "control_file.extension")?;
        if self.line_number == 0 {
            return Err(RelayError::config_error(
                "control_file.line_number is 1-based and must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// 队列到输出目录的绑定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBinding {
    pub queue: String,
    #[serde(default)]
    pub output_dir: PathBuf,
}

impl QueueBinding {
    pub fn new(queue: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue: queue.into(),
            output_dir: output_dir.into(),
        }
    }

    /// 输出目录为空视为未解析
    pub fn resolved_output_dir(&self) -> Option<&PathBuf> {
        if self.output_dir.as_os_str().is_empty() {
            None
        } else {
            Some(&self.output_dir)
        }
    }
}

/// 消费端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub process_list: PathBuf,
    pub bindings: Vec<QueueBinding>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            process_list: PathBuf::new(),
            bindings: ["starlight", "ppfx", "steckmap"]
                .into_iter()
                .map(|queue| QueueBinding::new(queue, PathBuf::new()))
                .collect(),
        }
    }
}

impl ConfigValidator for ConsumerConfig {
    fn validate(&self) -> RelayResult<()> {
        ValidationUtils::validate_path(&self.process_list, "consumer.process_list")?;

        if self.bindings.is_empty() {
            return Err(RelayError::config_error(
                "consumer.bindings must contain at least one queue",
            ));
        }

        let mut seen = HashSet::new();
        for binding in &self.bindings {
            ValidationUtils::validate_not_empty(&binding.queue, "consumer.bindings.queue")?;
            if binding.resolved_output_dir().is_none() {
                return Err(RelayError::config_error(format!(
                    "output directory not set for queue: {}",
                    binding.queue
                )));
            }
            if !seen.insert(binding.queue.as_str()) {
                return Err(RelayError::config_error(format!(
                    "duplicate binding for queue: {}",
                    binding.queue
                )));
            }
        }

        Ok(())
    }
}
