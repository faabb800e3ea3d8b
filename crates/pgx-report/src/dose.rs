//! 剂量调整计算
//!
//! 调整剂量 = 标准剂量 × 分类系数，保留一位小数。系数为 0 是临床警示
//! （应避免用药），与"无数据"严格区分。

use pgx_core::models::PLACEHOLDER;
use pgx_core::utils::round_one_decimal;
use serde::{Deserialize, Serialize};

/// 剂量计算结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum DoseOutcome {
    /// 正常调整后的剂量
    Adjusted(f64),
    /// 系数为 0：剂量为 0.0，应避免使用
    Withhold,
    /// 输入无效或分类没有系数
    NoResult,
}

impl DoseOutcome {
    /// 数值结果；Withhold 为 0.0
    pub fn value(&self) -> Option<f64> {
        match self {
            DoseOutcome::Adjusted(v) => Some(*v),
            DoseOutcome::Withhold => Some(0.0),
            DoseOutcome::NoResult => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            DoseOutcome::Adjusted(v) => format!("{:.1}", v),
            DoseOutcome::Withhold => "0.0 (avoid)".to_string(),
            DoseOutcome::NoResult => PLACEHOLDER.to_string(),
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, DoseOutcome::Withhold)
    }
}

/// 解析用户输入的标准剂量；空、非数字、负数或非有限值返回 None
pub fn parse_standard_dose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// 计算调整剂量
pub fn calculate_adjusted_dose(input: &str, modifier: Option<f64>) -> DoseOutcome {
    let (dose, modifier) = match (parse_standard_dose(input), modifier) {
        (Some(dose), Some(modifier)) => (dose, modifier),
        _ => return DoseOutcome::NoResult,
    };

    if modifier == 0.0 {
        DoseOutcome::Withhold
    } else {
        DoseOutcome::Adjusted(round_one_decimal(dose * modifier))
    }
}
