//! 分析后端抽象
//!
//! 流水线编排只依赖这个trait，HTTP实现位于 pgx-integration，
//! 测试中使用内存模拟实现。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AnalysisOutcome, AnalyzeRequest};

/// 上传并分析VCF的后端
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// 一次往返完成上传与分析
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisOutcome>;
}
