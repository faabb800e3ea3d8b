//! # PGx Core
//!
//! 药物基因组学报告客户端的核心模块，提供结果数据模型、服务端报文定义、
//! 报文规范化、统一错误类型以及分析后端抽象。

pub mod backend;
pub mod error;
pub mod models;
pub mod utils;
pub mod wire;

pub use backend::AnalysisBackend;
pub use error::{PgxError, Result};
pub use models::*;
