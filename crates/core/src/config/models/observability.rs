use serde::{Deserialize, Serialize};

use crate::config::validation::ConfigValidator;
use crate::{RelayError, RelayResult};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> RelayResult<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(RelayError::config_error(format!(
                    "Invalid log level: {other}"
                )))
            }
        }
        match self.log_format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(RelayError::config_error(format!(
                "Unsupported log format: {other}"
            ))),
        }
    }
}
