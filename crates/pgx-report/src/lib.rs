//! # PGx报告模块
//!
//! 在客户端对服务端结果做确定性的派生计算，包括：
//! - 风险分类：风险标签映射为分类、配色与剂量系数
//! - 剂量调整计算：标准剂量乘以分类系数
//! - 基因面板重建：服务端未提供时按基因去重生成
//! - 结果汇总：头部徽标的危急/调整/安全计数
//! - 表型转换推导与渐进式展开的视图状态

pub mod dose;
pub mod gene_panel;
pub mod phenoconversion;
pub mod render;
pub mod report;
pub mod risk;
pub mod summary;
pub mod view_state;

// 重新导出主要类型
pub use dose::{calculate_adjusted_dose, parse_standard_dose, DoseOutcome};
pub use gene_panel::{reconstruct_gene_panel, resolve_gene_panel, PanelSource};
pub use phenoconversion::{derive_phenoconversion, PhenoconversionState};
pub use render::{render_report, ReportText};
pub use report::{DrugRow, ReportView};
pub use risk::{classify, Accent, RiskCategory};
pub use summary::SummaryCounts;
pub use view_state::{Disclosure, DrugRowState, ViewState};
