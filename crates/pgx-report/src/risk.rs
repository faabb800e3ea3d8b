//! 风险分类
//!
//! 把服务端的风险标签映射为客户端的风险分类。分类是全函数：
//! 任何输入（包括空值）都得到一个完整的分类，不会失败。

use serde::{Deserialize, Serialize};

/// 风险分类（客户端派生，不在报文中传输）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RiskCategory {
    CriticalToxic,       // 毒性风险
    CriticalIneffective, // 无效
    Adjust,              // 需调整剂量
    Safe,                // 安全
    Unknown,             // 无数据
}

/// 分类的展示元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accent {
    pub color: &'static str,
    pub icon: &'static str,
    pub label: &'static str,
}

/// 按顺序匹配，先命中者优先
pub fn classify(label: Option<&str>) -> RiskCategory {
    let normalized = match label {
        Some(l) => l.trim().to_lowercase(),
        None => return RiskCategory::Unknown,
    };

    if normalized == "toxic" {
        RiskCategory::CriticalToxic
    } else if normalized == "ineffective" {
        RiskCategory::CriticalIneffective
    } else if normalized.contains("adjust") {
        RiskCategory::Adjust
    } else if normalized == "safe" {
        RiskCategory::Safe
    } else {
        RiskCategory::Unknown
    }
}

impl RiskCategory {
    pub fn from_label(label: &str) -> Self {
        classify(Some(label))
    }

    /// 剂量系数；Unknown 没有系数
    pub fn dose_modifier(&self) -> Option<f64> {
        match self {
            RiskCategory::CriticalToxic | RiskCategory::CriticalIneffective => Some(0.0),
            RiskCategory::Adjust => Some(0.5),
            RiskCategory::Safe => Some(1.0),
            RiskCategory::Unknown => None,
        }
    }

    pub fn accent(&self) -> Accent {
        match self {
            RiskCategory::CriticalToxic => Accent { color: "#DC2626", icon: "☠", label: "Toxic" },
            RiskCategory::CriticalIneffective => Accent { color: "#EA580C", icon: "⊘", label: "Ineffective" },
            RiskCategory::Adjust => Accent { color: "#D97706", icon: "⚠", label: "Adjust Dose" },
            RiskCategory::Safe => Accent { color: "#16A34A", icon: "✔", label: "Safe" },
            RiskCategory::Unknown => Accent { color: "#6B7280", icon: "?", label: "Unknown" },
        }
    }

    /// 严重程度排序，数值越大越严重
    pub fn severity_rank(&self) -> u8 {
        match self {
            RiskCategory::CriticalToxic => 4,
            RiskCategory::CriticalIneffective => 3,
            RiskCategory::Adjust => 2,
            RiskCategory::Unknown => 1,
            RiskCategory::Safe => 0,
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, RiskCategory::CriticalToxic | RiskCategory::CriticalIneffective)
    }
}
