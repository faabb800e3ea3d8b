//! 报告视图
//!
//! 把一次分析的返回组装成结果页所需的全部派生数据：
//! 基因面板补全 → 风险分类 → 汇总计数 → 视图状态。

use pgx_core::{AnalysisOutcome, AnalysisResult, GenePanelEntry, PgxError, Result, UploadMetadata};
use tracing::info;

use crate::dose::DoseOutcome;
use crate::gene_panel::{resolve_gene_panel, PanelSource};
use crate::phenoconversion::{derive_phenoconversion, PhenoconversionState};
use crate::risk::{classify, RiskCategory};
use crate::summary::SummaryCounts;
use crate::view_state::ViewState;

/// 已分类的药物行
#[derive(Debug, Clone, PartialEq)]
pub struct DrugRow {
    pub result: AnalysisResult,
    pub category: RiskCategory,
    pub phenoconversion: PhenoconversionState,
}

/// 结果页
#[derive(Debug, Clone)]
pub struct ReportView {
    metadata: UploadMetadata,
    rows: Vec<DrugRow>,
    gene_panel: Vec<GenePanelEntry>,
    panel_source: PanelSource,
    summary: SummaryCounts,
    view: ViewState,
}

impl ReportView {
    /// 由分析返回构建报告，视图状态全部重置
    pub fn from_outcome(outcome: AnalysisOutcome) -> Self {
        let AnalysisOutcome {
            metadata,
            results,
            gene_panel,
        } = outcome;

        let (gene_panel, panel_source) = resolve_gene_panel(gene_panel, &results);

        let mut rows: Vec<DrugRow> = results
            .into_iter()
            .map(|result| DrugRow {
                category: classify(Some(&result.risk_assessment.risk_label)),
                phenoconversion: derive_phenoconversion(&result),
                result,
            })
            .collect();
        // 稳定排序，同级保持服务端顺序
        rows.sort_by_key(|row| std::cmp::Reverse(row.category.severity_rank()));

        let summary = SummaryCounts::from_categories(rows.iter().map(|row| row.category));
        let view = ViewState::new(gene_panel.iter().map(|entry| entry.gene.clone()), rows.len());

        info!(
            "Report for {}: {} drugs, {} genes ({:?}), critical={} warn={} safe={}",
            metadata.patient_code,
            rows.len(),
            gene_panel.len(),
            panel_source,
            summary.critical,
            summary.warn,
            summary.safe
        );

        Self {
            metadata,
            rows,
            gene_panel,
            panel_source,
            summary,
            view,
        }
    }

    pub fn metadata(&self) -> &UploadMetadata {
        &self.metadata
    }

    pub fn rows(&self) -> &[DrugRow] {
        &self.rows
    }

    pub fn row(&self, drug: &str) -> Option<&DrugRow> {
        self.row_index(drug).and_then(|index| self.rows.get(index))
    }

    /// 药物名对应的第一条结果的行号，忽略大小写
    pub fn row_index(&self, drug: &str) -> Option<usize> {
        self.rows.iter().position(|row| row.result.drug.eq_ignore_ascii_case(drug))
    }

    pub fn gene_panel(&self) -> &[GenePanelEntry] {
        &self.gene_panel
    }

    pub fn panel_source(&self) -> PanelSource {
        self.panel_source
    }

    pub fn summary(&self) -> SummaryCounts {
        self.summary
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    /// 在药物行的剂量计算器中输入标准剂量，返回重新计算的结果
    ///
    /// 同一药物有多条结果时作用于第一条，其余行用 [`Self::enter_dose_at`]。
    pub fn enter_dose(&mut self, drug: &str, input: &str) -> Result<DoseOutcome> {
        let index = self
            .row_index(drug)
            .ok_or_else(|| PgxError::Validation(format!("No result for drug {drug}")))?;
        self.enter_dose_at(index, input)
    }

    pub fn enter_dose_at(&mut self, index: usize, input: &str) -> Result<DoseOutcome> {
        let category = self
            .rows
            .get(index)
            .map(|row| row.category)
            .ok_or_else(|| PgxError::Validation(format!("No result at row {index}")))?;

        let state = self
            .view
            .drug_row_mut(index)
            .ok_or_else(|| PgxError::Internal(format!("Missing view state for row {index}")))?;
        state.set_dose_input(input);
        Ok(state.adjusted_dose(category))
    }

    /// 当前输入下的调整剂量
    pub fn adjusted_dose(&self, drug: &str) -> Option<DoseOutcome> {
        self.adjusted_dose_at(self.row_index(drug)?)
    }

    pub fn adjusted_dose_at(&self, index: usize) -> Option<DoseOutcome> {
        let row = self.rows.get(index)?;
        let state = self.view.drug_row(index)?;
        Some(state.adjusted_dose(row.category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgx_core::wire::ResultsPayload;
    use serde_json::{json, Value};

    fn outcome(value: Value) -> AnalysisOutcome {
        serde_json::from_value::<ResultsPayload>(value)
            .unwrap()
            .into_outcome("PT-7")
    }

    fn drug(name: &str, gene: &str, label: &str) -> Value {
        json!({
            "drug": name,
            "pharmacogenomic_profile": { "primary_gene": gene, "diplotype": "*1/*2", "phenotype": "IM" },
            "risk_assessment": { "risk_label": label, "confidence_score": 0.9 }
        })
    }

    #[test]
    fn test_report_pipeline() {
        let report = ReportView::from_outcome(outcome(json!({
            "patient_code": "PT-7",
            "results": [
                drug("SIMVASTATIN", "SLCO1B1", "Safe"),
                drug("CODEINE", "CYP2D6", "Toxic"),
                drug("WARFARIN", "CYP2C9", "Adjust Dose"),
                drug("TRAMADOL", "CYP2D6", "Unknown"),
                drug("CLOPIDOGREL", "CYP2C19", "Ineffective")
            ]
        })));

        assert_eq!(report.summary(), SummaryCounts { critical: 2, warn: 1, safe: 1 });
        assert_eq!(report.panel_source(), PanelSource::Reconstructed);
        assert_eq!(report.gene_panel().len(), 4);

        let order: Vec<&str> = report.rows().iter().map(|r| r.result.drug.as_str()).collect();
        assert_eq!(order, vec!["CODEINE", "CLOPIDOGREL", "WARFARIN", "TRAMADOL", "SIMVASTATIN"]);
    }

    #[test]
    fn test_server_panel_kept() {
        let report = ReportView::from_outcome(outcome(json!({
            "results": [drug("CODEINE", "CYP2D6", "Safe")],
            "gene_panel": [{ "gene": "CYP2D6", "diplotype": "*1/*1", "phenotype": "NM", "summary": "server text" }]
        })));
        assert_eq!(report.panel_source(), PanelSource::Server);
        assert_eq!(report.gene_panel()[0].summary, "server text");
    }

    #[test]
    fn test_enter_dose() {
        let mut report = ReportView::from_outcome(outcome(json!({
            "results": [drug("WARFARIN", "CYP2C9", "Adjust Dose"), drug("CODEINE", "CYP2D6", "Toxic")]
        })));

        assert_eq!(report.adjusted_dose("WARFARIN"), Some(DoseOutcome::NoResult));
        assert_eq!(report.enter_dose("warfarin", "10").unwrap().display(), "5.0");
        assert_eq!(report.adjusted_dose("WARFARIN").unwrap().display(), "5.0");
        assert_eq!(report.enter_dose("CODEINE", "30").unwrap(), DoseOutcome::Withhold);
        assert!(report.enter_dose("ASPIRIN", "10").is_err());
    }

    #[test]
    fn test_duplicate_drug_rows_are_independent() {
        let mut report = ReportView::from_outcome(outcome(json!({
            "results": [drug("WARFARIN", "CYP2C9", "Adjust Dose"), drug("WARFARIN", "VKORC1", "Adjust Dose")]
        })));
        assert_eq!(report.rows().len(), 2);

        report.view_mut().drug_row_mut(1).unwrap().row.expand();
        assert_eq!(report.enter_dose("WARFARIN", "10").unwrap().display(), "5.0");
        assert_eq!(report.enter_dose_at(1, "4").unwrap().display(), "2.0");

        assert!(!report.view().drug_row(0).unwrap().row.is_open());
        assert!(report.view().drug_row(1).unwrap().row.is_open());
        assert_eq!(report.adjusted_dose_at(0).unwrap().display(), "5.0");
        assert_eq!(report.adjusted_dose_at(1).unwrap().display(), "2.0");
        assert!(report.enter_dose_at(2, "10").is_err());
    }

    #[test]
    fn test_empty_outcome() {
        let report = ReportView::from_outcome(outcome(json!({})));
        assert!(report.rows().is_empty());
        assert!(report.gene_panel().is_empty());
        assert_eq!(report.summary(), SummaryCounts::default());
        assert_eq!(report.metadata().patient_code, "PT-7");
    }
}
