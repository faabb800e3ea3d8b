//! 报告文本渲染
//!
//! 按当前视图状态输出终端可读的报告：头部徽标、基因卡片、药物行。

use std::fmt::{self, Write};

use pgx_core::models::PLACEHOLDER;

use crate::dose::DoseOutcome;
use crate::report::{DrugRow, ReportView};
use crate::view_state::DrugRowState;

fn marker(open: bool) -> &'static str {
    if open {
        "▾"
    } else {
        "▸"
    }
}

/// 报告的文本形式，按视图状态折叠或展开
pub struct ReportText<'a>(pub &'a ReportView);

impl fmt::Display for ReportText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        write_header(f, report)?;
        write_gene_panel(f, report)?;

        writeln!(f, "\nDrug risks")?;
        if report.rows().is_empty() {
            writeln!(f, "  {}", PLACEHOLDER)?;
        }
        let fallback = DrugRowState::default();
        for (index, row) in report.rows().iter().enumerate() {
            let state = report.view().drug_row(index).unwrap_or(&fallback);
            write_row(f, row, state)?;
        }
        Ok(())
    }
}

/// 渲染整个报告
pub fn render_report(report: &ReportView) -> String {
    ReportText(report).to_string()
}

fn write_header(out: &mut impl Write, report: &ReportView) -> fmt::Result {
    let meta = report.metadata();
    let summary = report.summary();

    writeln!(out, "Patient {}", meta.patient_code)?;
    if let Some(id) = &meta.patient_id {
        writeln!(out, "  ID: {}", id)?;
    }
    writeln!(out, "  Variants parsed: {}", meta.total_variants_parsed)?;
    writeln!(
        out,
        "  [critical {}] [adjust {}] [safe {}]",
        summary.critical, summary.warn, summary.safe
    )
}

fn write_gene_panel(out: &mut impl Write, report: &ReportView) -> fmt::Result {
    writeln!(out, "\nGene panel")?;
    if report.gene_panel().is_empty() {
        writeln!(out, "  {}", PLACEHOLDER)?;
    }
    for entry in report.gene_panel() {
        let open = report
            .view()
            .gene_card(&entry.gene)
            .map(|d| d.is_open())
            .unwrap_or(false);
        writeln!(
            out,
            "  {} {:<8} {:<10} {}",
            marker(open),
            entry.gene,
            entry.diplotype,
            entry.phenotype
        )?;
        if !open {
            continue;
        }
        writeln!(out, "      {}", entry.summary)?;
        if let Some(inhibitor) = &entry.active_inhibitor {
            writeln!(out, "      Active inhibitor: {}", inhibitor)?;
        }
        for variant in &entry.variants {
            writeln!(
                out,
                "      {} {}>{} {} {} {}",
                variant.rsid.as_deref().unwrap_or(PLACEHOLDER),
                variant.ref_allele,
                variant.alt_allele,
                variant.genotype,
                variant.star_allele.as_deref().unwrap_or(PLACEHOLDER),
                variant.filter
            )?;
        }
    }
    Ok(())
}

fn write_row(out: &mut impl Write, row: &DrugRow, state: &DrugRowState) -> fmt::Result {
    let accent = row.category.accent();
    let result = &row.result;
    writeln!(
        out,
        "  {} {} {:<14} {:<12} {:>3.0}%",
        marker(state.row.is_open()),
        accent.icon,
        result.drug,
        accent.label,
        result.risk_assessment.confidence_score * 100.0
    )?;
    if !state.row.is_open() {
        return Ok(());
    }

    let rec = &result.clinical_recommendation;
    writeln!(
        out,
        "      Gene: {}  Diplotype: {}  Phenotype: {}",
        result.primary_gene().unwrap_or(PLACEHOLDER),
        result.pharmacogenomic_profile.diplotype,
        result.pharmacogenomic_profile.phenotype
    )?;
    writeln!(out, "      Severity: {}", result.risk_assessment.severity)?;
    writeln!(out, "      Action: {}", rec.action)?;
    if !rec.alternative_drugs.is_empty() {
        writeln!(out, "      Alternatives: {}", rec.alternative_drugs.join(", "))?;
    }
    writeln!(out, "      Evidence: {}", rec.evidence_level)?;
    let flag = if row.phenoconversion.divergent { " (flags disagree)" } else { "" };
    writeln!(out, "      {}{}", row.phenoconversion.note, flag)?;

    if !state.dose_input().trim().is_empty() {
        let dose = state.adjusted_dose(row.category);
        let warning = if dose == DoseOutcome::Withhold { "  !! do not administer" } else { "" };
        writeln!(
            out,
            "      Dose: {} -> {}{}",
            state.dose_input().trim(),
            dose.display(),
            warning
        )?;
    }

    let explanation = match &result.llm_explanation {
        Some(explanation) => explanation,
        None => return Ok(()),
    };
    writeln!(out, "      {} Explanation", marker(state.explanation.is_open()))?;
    if !state.explanation.is_open() {
        return Ok(());
    }
    writeln!(out, "        {}", explanation.summary)?;
    writeln!(out, "        Mechanism: {}", explanation.mechanism)?;
    if let Some(pheno) = &explanation.phenoconversion_explanation {
        writeln!(out, "        {}", pheno)?;
    }
    writeln!(out, "        {} Sources", marker(state.sources.is_open()))?;
    if state.sources.is_open() {
        writeln!(out, "          {}", explanation.guideline_recommendation)?;
        if let Some(version) = &rec.guideline_version {
            writeln!(out, "          CPIC guideline {}", version)?;
        }
    }
    Ok(())
}
