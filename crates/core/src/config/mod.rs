//! 配置管理
//!
//! 配置按以下顺序合并，后者覆盖前者：内置默认值、TOML配置文件、
//! `RELAY__` 前缀环境变量、旧部署使用的环境变量。

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::{ConfigValidator, ValidationUtils};
