//! # PGx工作流模块
//!
//! 管理从提交到出结果的完整流程，包括：
//! - 上传会话：患者编号、VCF文件、药物与合并用药的表单状态及提交校验
//! - 流水线状态机：阶段 0（空闲）到 7（完成）的合法转换
//! - 流水线编排：真实请求与本地进度计时器的竞争，响应优先、取消无条件

pub mod orchestrator;
pub mod session;
pub mod state_machine;

// 重新导出主要类型
pub use orchestrator::{PipelineConfig, PipelineOrchestrator};
pub use session::{SubmissionBlocker, UploadSession};
pub use state_machine::{PipelineEvent, PipelineStage, PipelineState, PipelineStateMachine, Terminal};
