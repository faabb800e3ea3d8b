//! # PGx管理模块
//!
//! 客户端运行所需的配置加载、校验以及日志初始化

pub mod config;
pub mod logging;

pub use config::{ClientConfig, ConfigManager, ConfigValidator};
pub use logging::init_logging;
