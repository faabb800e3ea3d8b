//! 渐进式展开的视图状态
//!
//! 每个基因卡片、药物行、解释面板和来源子面板各自持有独立的展开标志，
//! 只属于界面状态，不回写数据模型。新的报告会创建全新的状态。

use std::collections::BTreeMap;

use crate::dose::{calculate_adjusted_dose, DoseOutcome};
use crate::risk::RiskCategory;

/// 单个可展开区域
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disclosure {
    open: bool,
}

impl Disclosure {
    pub fn collapsed() -> Self {
        Self { open: false }
    }

    pub fn expanded() -> Self {
        Self { open: true }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn toggle(&mut self) -> bool {
        self.open = !self.open;
        self.open
    }

    pub fn expand(&mut self) {
        self.open = true;
    }

    pub fn collapse(&mut self) {
        self.open = false;
    }
}

/// 药物行状态，包括剂量计算器的输入
#[derive(Debug, Clone, PartialEq)]
pub struct DrugRowState {
    pub row: Disclosure,
    /// AI解释面板，默认展开
    pub explanation: Disclosure,
    /// 指南来源子面板
    pub sources: Disclosure,
    dose_input: String,
}

impl Default for DrugRowState {
    fn default() -> Self {
        Self {
            row: Disclosure::collapsed(),
            explanation: Disclosure::expanded(),
            sources: Disclosure::collapsed(),
            dose_input: String::new(),
        }
    }
}

impl DrugRowState {
    pub fn dose_input(&self) -> &str {
        &self.dose_input
    }

    pub fn set_dose_input(&mut self, input: impl Into<String>) {
        self.dose_input = input.into();
    }

    /// 每次调用都按当前输入重新计算
    pub fn adjusted_dose(&self, category: RiskCategory) -> DoseOutcome {
        calculate_adjusted_dose(&self.dose_input, category.dose_modifier())
    }
}

/// 报告视图的全部展开状态
///
/// 药物行按其在报告中的位置索引，同一药物的多条结果互不影响。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    gene_cards: BTreeMap<String, Disclosure>,
    drug_rows: Vec<DrugRowState>,
}

impl ViewState {
    pub fn new<G>(genes: G, row_count: usize) -> Self
    where
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            gene_cards: genes.into_iter().map(|g| (g.into(), Disclosure::collapsed())).collect(),
            drug_rows: vec![DrugRowState::default(); row_count],
        }
    }

    pub fn gene_card(&self, gene: &str) -> Option<&Disclosure> {
        self.gene_cards.get(gene)
    }

    pub fn gene_card_mut(&mut self, gene: &str) -> Option<&mut Disclosure> {
        self.gene_cards.get_mut(gene)
    }

    pub fn drug_row(&self, index: usize) -> Option<&DrugRowState> {
        self.drug_rows.get(index)
    }

    pub fn drug_row_mut(&mut self, index: usize) -> Option<&mut DrugRowState> {
        self.drug_rows.get_mut(index)
    }

    /// 展开所有基因卡片和药物行
    pub fn expand_all(&mut self) {
        self.gene_cards.values_mut().for_each(Disclosure::expand);
        self.drug_rows.iter_mut().for_each(|row| row.row.expand());
    }

    pub fn collapse_all(&mut self) {
        self.gene_cards.values_mut().for_each(Disclosure::collapse);
        self.drug_rows.iter_mut().for_each(|row| row.row.collapse());
    }
}
