// 配置验证
// 只保留启动时需要的基础校验

use std::path::Path;

use crate::{RelayError, RelayResult};

/// 配置段验证接口
pub trait ConfigValidator {
    fn validate(&self) -> RelayResult<()>;
}

/// 验证工具函数
pub struct ValidationUtils;

impl ValidationUtils {
    /// 验证字符串非空
    pub fn validate_not_empty(value: &str, field_name: &str) -> RelayResult<()> {
        if value.trim().is_empty() {
            return Err(RelayError::config_error(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// 验证路径已配置
    pub fn validate_path(path: &Path, field_name: &str) -> RelayResult<()> {
        if path.as_os_str().is_empty() {
            return Err(RelayError::config_error(format!(
                "{field_name} must be configured"
            )));
        }
        Ok(())
    }

    /// 验证端口号
    pub fn validate_port(port: u16) -> RelayResult<()> {
        if port == 0 {
            return Err(RelayError::config_error("Port cannot be 0"));
        }
        Ok(())
    }

    /// 验证超时值
    pub fn validate_timeout(timeout_seconds: u64, field_name: &str) -> RelayResult<()> {
        if timeout_seconds == 0 {
            return Err(RelayError::config_error(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if timeout_seconds > 3600 {
            return Err(RelayError::config_error(format!(
                "{field_name} must be less than or equal to 3600 seconds"
            )));
        }
        Ok(())
    }

    /// 验证计数值
    pub fn validate_count(count: usize, field_name: &str, max_value: usize) -> RelayResult<()> {
        if count == 0 {
            return Err(RelayError::config_error(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max_value {
            return Err(RelayError::config_error(format!(
                "{field_name} must be less than or equal to {max_value}"
            )));
        }
        Ok(())
    }
}
