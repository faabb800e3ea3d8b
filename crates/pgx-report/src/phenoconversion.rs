//! 表型转换状态推导
//!
//! 权威来源是 risk_assessment.phenoconversion_occurred；quality_metrics 中的
//! 镜像字段只在权威字段缺失时使用，两者不一致时标记 divergent。
//! 服务端给出的说明文本优先于本地生成的文本。

use pgx_core::{AnalysisResult, PhenoconversionSource};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 单个药物的表型转换状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhenoconversionState {
    pub occurred: bool,
    pub genetic_phenotype: Option<String>,
    pub clinical_phenotype: String,
    pub active_inhibitor: Option<String>,
    pub source: PhenoconversionSource,
    /// 权威字段与镜像字段不一致
    pub divergent: bool,
    pub note: String,
}

pub fn derive_phenoconversion(result: &AnalysisResult) -> PhenoconversionState {
    let profile = &result.pharmacogenomic_profile;
    let occurred = result.risk_assessment.phenoconversion_occurred;
    let source = result.phenoconversion_source;

    let divergent = source == PhenoconversionSource::Canonical
        && result
            .quality_metrics
            .phenoconversion_detected
            .is_some_and(|mirror| mirror != occurred);
    if divergent {
        warn!(
            "Divergent phenoconversion flags for {}: canonical={}, mirror={:?}",
            result.drug, occurred, result.quality_metrics.phenoconversion_detected
        );
    }

    let note = match &result.clinical_recommendation.phenoconversion_note {
        Some(server_note) => server_note.clone(),
        None => local_note(result, occurred),
    };

    PhenoconversionState {
        occurred,
        genetic_phenotype: profile.genetic_phenotype.clone(),
        clinical_phenotype: profile.phenotype.clone(),
        active_inhibitor: profile.active_inhibitor.clone(),
        source,
        divergent,
        note,
    }
}

fn local_note(result: &AnalysisResult, occurred: bool) -> String {
    if !occurred {
        return "No phenoconversion detected.".to_string();
    }
    let profile = &result.pharmacogenomic_profile;
    let cause = profile
        .active_inhibitor
        .as_deref()
        .unwrap_or("a concurrent medication");
    match profile.genetic_phenotype.as_deref() {
        Some(genetic) if genetic != profile.phenotype => format!(
            "Patient is genotypically {} but phenotypically {} due to {}.",
            genetic, profile.phenotype, cause
        ),
        // 缺少遗传表型时只陈述临床表型
        _ => format!(
            "Phenoconversion detected: patient is phenotypically {} due to {}.",
            profile.phenotype, cause
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgx_core::wire::normalize_result;
    use serde_json::{json, Value};

    fn result(value: Value) -> AnalysisResult {
        normalize_result(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_phenoconversion_note() {
        let state = derive_phenoconversion(&result(json!({
            "drug": "CODEINE",
            "pharmacogenomic_profile": {
                "primary_gene": "CYP2D6", "phenotype": "PM",
                "genetic_phenotype": "NM", "active_inhibitor": "FLUOXETINE"
            },
            "risk_assessment": { "risk_label": "Ineffective", "phenoconversion_occurred": true }
        })));

        assert!(state.occurred);
        assert!(!state.divergent);
        assert_eq!(state.note, "Patient is genotypically NM but phenotypically PM due to FLUOXETINE.");
    }

    #[test]
    fn test_server_note_is_preferred() {
        let state = derive_phenoconversion(&result(json!({
            "drug": "CODEINE",
            "pharmacogenomic_profile": { "primary_gene": "CYP2D6", "diplotype": "*1/*1", "phenotype": "Poor Metabolizer" },
            "risk_assessment": { "risk_label": "Ineffective", "confidence_score": 0.9, "severity": "high" },
            "clinical_recommendation": {
                "action": "Avoid codeine",
                "phenoconversion_note": "Patient is genotypically Normal Metabolizer but phenotypically Poor Metabolizer due to FLUOXETINE."
            },
            "quality_metrics": { "phenoconversion_detected": true }
        })));

        assert!(state.occurred);
        assert_eq!(state.source, PhenoconversionSource::Mirror);
        assert_eq!(state.genetic_phenotype, None);
        assert_eq!(
            state.note,
            "Patient is genotypically Normal Metabolizer but phenotypically Poor Metabolizer due to FLUOXETINE."
        );
    }

    #[test]
    fn test_missing_genetic_phenotype_never_contradicts() {
        let state = derive_phenoconversion(&result(json!({
            "drug": "CODEINE",
            "pharmacogenomic_profile": { "primary_gene": "CYP2D6", "phenotype": "Poor Metabolizer" },
            "quality_metrics": { "phenoconversion_detected": true }
        })));

        assert!(state.occurred);
        assert!(!state.note.contains("genotypically"));
        assert_eq!(
            state.note,
            "Phenoconversion detected: patient is phenotypically Poor Metabolizer due to a concurrent medication."
        );
    }

    #[test]
    fn test_no_phenoconversion() {
        let state = derive_phenoconversion(&result(json!({ "drug": "WARFARIN" })));
        assert!(!state.occurred);
        assert_eq!(state.source, PhenoconversionSource::Absent);
        assert_eq!(state.note, "No phenoconversion detected.");
    }

    #[test]
    fn test_divergent_mirror_is_flagged() {
        let state = derive_phenoconversion(&result(json!({
            "drug": "CODEINE",
            "risk_assessment": { "phenoconversion_occurred": false },
            "quality_metrics": { "phenoconversion_detected": true }
        })));

        // 权威字段优先
        assert!(!state.occurred);
        assert!(state.divergent);
        assert_eq!(state.source, PhenoconversionSource::Canonical);
    }

    #[test]
    fn test_mirror_used_when_canonical_missing() {
        let state = derive_phenoconversion(&result(json!({
            "drug": "CODEINE",
            "quality_metrics": { "ui_phenoconversion": true }
        })));
        assert!(state.occurred);
        assert!(!state.divergent);
        assert_eq!(state.source, PhenoconversionSource::Mirror);
    }
}
