//! 错误定义模块

use thiserror::Error;

/// 分析失败时的通用提示
pub const GENERIC_FAILURE_MESSAGE: &str = "Analysis failed. Please try again.";

/// PGx客户端统一错误类型
#[derive(Error, Debug)]
pub enum PgxError {
    #[error("配置错误: {0}")]
    Config(String),

    /// 提交前的输入校验失败，消息直接展示给用户
    #[error("{0}")]
    Validation(String),

    #[error("网络错误: {0}")]
    Network(String),

    /// 服务端返回的失败消息，原样展示
    #[error("{0}")]
    Api(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("操作已取消")]
    Cancelled,

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl PgxError {
    /// 用户可通过修改输入或重新提交恢复的错误
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            PgxError::Validation(_) | PgxError::Network(_) | PgxError::Api(_) | PgxError::Cancelled
        )
    }

    /// 面向用户的提示文本，传输与报文解析细节只写日志
    pub fn user_message(&self) -> String {
        match self {
            PgxError::Validation(msg) | PgxError::Api(msg) => msg.clone(),
            PgxError::Network(_) | PgxError::Serialization(_) => GENERIC_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// PGx客户端统一结果类型
pub type Result<T> = std::result::Result<T, PgxError>;
