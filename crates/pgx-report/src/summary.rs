//! 结果汇总
//!
//! 为报告头部徽标统计各类风险数量。Unknown 不计入任何一类。

use serde::{Deserialize, Serialize};

use crate::risk::RiskCategory;

/// 头部徽标计数
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryCounts {
    /// 毒性 + 无效
    pub critical: usize,
    /// 需调整剂量
    pub warn: usize,
    pub safe: usize,
}

impl SummaryCounts {
    pub fn from_categories<I>(categories: I) -> Self
    where
        I: IntoIterator<Item = RiskCategory>,
    {
        categories
            .into_iter()
            .fold(SummaryCounts::default(), |mut counts, category| {
                match category {
                    RiskCategory::CriticalToxic | RiskCategory::CriticalIneffective => counts.critical += 1,
                    RiskCategory::Adjust => counts.warn += 1,
                    RiskCategory::Safe => counts.safe += 1,
                    RiskCategory::Unknown => {}
                }
                counts
            })
    }

    pub fn total(&self) -> usize {
        self.critical + self.warn + self.safe
    }
}
