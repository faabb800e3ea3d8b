//! 服务端报文定义与规范化
//!
//! 服务端的所有字段都可能缺失，这里统一按字段给出默认值：
//! 风险标签缺失为 "Unknown"，列表缺失为空，展示文本缺失为占位符。
//! 其它模块只接触 [`crate::models`] 中规范化后的类型。

use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PgxError, Result, GENERIC_FAILURE_MESSAGE};
use crate::models::*;
use crate::utils::non_blank;

/// 标准响应信封 `{success, data, error}`
///
/// HTTP异常时服务端把信封包在 `detail` 里，`detail` 也可能只是一段文本。
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<Value>,
}

impl<T> ApiEnvelope<T> {
    /// 成功时取出数据，否则返回服务端的错误消息
    pub fn into_result(self) -> Result<T> {
        if !self.success {
            return Err(PgxError::Api(self.failure_message()));
        }
        self.data
            .ok_or_else(|| PgxError::Api("Response did not contain any data".to_string()))
    }

    /// 依次取 error、detail.error、detail 文本，最后是通用提示
    pub fn failure_message(&self) -> String {
        if let Some(msg) = non_blank(self.error.clone()) {
            return msg;
        }
        match &self.detail {
            Some(Value::Object(map)) => map
                .get("error")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// 类型不符的字段按缺失处理，只影响该字段
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            warn!("Ignoring malformed field value: {}", e);
            Ok(None)
        }
    }
}

/// 置信度可能以数字或数字字符串出现
fn lenient_score<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let score = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Null => None,
        other => {
            warn!("Ignoring malformed confidence score: {}", other);
            None
        }
    };
    Ok(score)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawVariant {
    #[serde(deserialize_with = "lenient")]
    pub rsid: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub chromosome: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub position: Option<i64>,
    #[serde(alias = "ref_allele", deserialize_with = "lenient")]
    pub r#ref: Option<String>,
    #[serde(alias = "alt_allele", deserialize_with = "lenient")]
    pub alt: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub genotype: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub star_allele: Option<String>,
    #[serde(alias = "filter_status", deserialize_with = "lenient")]
    pub filter: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub functional_impact: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawProfile {
    #[serde(deserialize_with = "lenient")]
    pub primary_gene: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub diplotype: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub phenotype: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub genetic_phenotype: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub active_inhibitor: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub detected_variants: Option<Vec<RawVariant>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawRiskAssessment {
    #[serde(deserialize_with = "lenient")]
    pub risk_label: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub severity: Option<String>,
    #[serde(deserialize_with = "lenient_score")]
    pub confidence_score: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub phenoconversion_occurred: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawRecommendation {
    #[serde(deserialize_with = "lenient")]
    pub action: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub alternative_drugs: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    pub evidence_level: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub cpic_guideline_version: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub phenoconversion_note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawExplanation {
    #[serde(deserialize_with = "lenient")]
    pub summary: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub mechanism: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub guideline_recommendation: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub phenoconversion_explanation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawQualityMetrics {
    #[serde(deserialize_with = "lenient")]
    pub vcf_parsing_success: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub variants_detected: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    pub genes_called_successfully: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    pub genes_failed: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    pub phenoconversion_detected: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub ui_phenoconversion: Option<bool>,
}

/// 服务端返回的单个药物结果
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawAnalysisResult {
    #[serde(deserialize_with = "lenient")]
    pub drug: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub patient_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub timestamp: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub pharmacogenomic_profile: Option<RawProfile>,
    #[serde(deserialize_with = "lenient")]
    pub risk_assessment: Option<RawRiskAssessment>,
    #[serde(deserialize_with = "lenient")]
    pub clinical_recommendation: Option<RawRecommendation>,
    #[serde(alias = "llm_generated_explanation", deserialize_with = "lenient")]
    pub llm_explanation: Option<RawExplanation>,
    #[serde(deserialize_with = "lenient")]
    pub quality_metrics: Option<RawQualityMetrics>,
}

impl RawAnalysisResult {
    /// `{}` 这类空对象表示没有结果
    pub fn is_blank(&self) -> bool {
        self.drug.is_none()
            && self.pharmacogenomic_profile.is_none()
            && self.risk_assessment.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawGenePanelEntry {
    #[serde(deserialize_with = "lenient")]
    pub gene: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub diplotype: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub phenotype: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub genetic_phenotype: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub active_inhibitor: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub variant_count: Option<usize>,
    #[serde(deserialize_with = "lenient")]
    pub variants: Option<Vec<RawVariant>>,
    #[serde(deserialize_with = "lenient")]
    pub summary: Option<String>,
}

/// `/analyze` 与 `/results` 的 data 信封，results 另行解析
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalysisData {
    #[serde(deserialize_with = "lenient")]
    patient_code: Option<String>,
    #[serde(deserialize_with = "lenient")]
    patient_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    total_variants_parsed: Option<u64>,
    results: Value,
    #[serde(deserialize_with = "lenient")]
    gene_panel: Option<Vec<RawGenePanelEntry>>,
}

/// 结果报文
///
/// 按ID查询时 data 可能是完整信封、结果数组、单个结果或空对象。
/// 带 `results` 键的对象才是信封，其余对象按单个结果处理。
#[derive(Debug, Default)]
pub struct ResultsPayload {
    pub patient_code: Option<String>,
    pub patient_id: Option<String>,
    pub total_variants_parsed: Option<u64>,
    pub results: Vec<RawAnalysisResult>,
    pub gene_panel: Option<Vec<RawGenePanelEntry>>,
}

/// null 为空，数组逐项解析，其它值按单个结果解析
fn parse_results(value: Value) -> Result<Vec<RawAnalysisResult>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(PgxError::from))
            .collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

impl ResultsPayload {
    /// 按形态解析 data
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) if map.contains_key("results") => {
                let data: AnalysisData = serde_json::from_value(Value::Object(map))?;
                Ok(Self {
                    patient_code: data.patient_code,
                    patient_id: data.patient_id,
                    total_variants_parsed: data.total_variants_parsed,
                    results: parse_results(data.results)?,
                    gene_panel: data.gene_panel,
                })
            }
            other => Ok(Self {
                results: parse_results(other)?,
                ..Self::default()
            }),
        }
    }

    /// 规范化为 [`AnalysisOutcome`]，这是唯一处理结果形态差异的地方
    pub fn into_outcome(self, fallback_patient_code: &str) -> AnalysisOutcome {
        let results: Vec<AnalysisResult> = self
            .results
            .into_iter()
            .filter(|raw| !raw.is_blank())
            .map(normalize_result)
            .collect();

        let gene_panel = self.gene_panel.map(|entries| {
            entries
                .into_iter()
                .filter_map(normalize_gene_panel_entry)
                .collect::<Vec<_>>()
        });

        let patient_id = non_blank(self.patient_id)
            .or_else(|| results.iter().find_map(|r| r.patient_id.clone()));
        let total_variants_parsed = self.total_variants_parsed.unwrap_or_else(|| {
            results
                .first()
                .map(|r| r.quality_metrics.variants_detected)
                .unwrap_or(0)
        });

        debug!(
            "Normalized payload: {} results, server gene panel: {}",
            results.len(),
            gene_panel.as_ref().map(|p| p.len()).unwrap_or(0)
        );

        AnalysisOutcome {
            metadata: UploadMetadata {
                patient_code: non_blank(self.patient_code)
                    .unwrap_or_else(|| fallback_patient_code.to_string()),
                patient_id,
                total_variants_parsed,
                file_name: None,
            },
            results,
            gene_panel,
        }
    }
}

impl<'de> Deserialize<'de> for ResultsPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

/// `/supported-drugs` 列表项
#[derive(Debug, Deserialize)]
pub struct RawSupportedDrug {
    pub drug: String,
    #[serde(default)]
    pub primary_gene: Option<String>,
}

impl From<RawSupportedDrug> for SupportedDrug {
    fn from(raw: RawSupportedDrug) -> Self {
        SupportedDrug {
            drug: raw.drug.trim().to_ascii_uppercase(),
            primary_gene: non_blank(raw.primary_gene).unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

fn text_or(value: Option<String>, default: &str) -> String {
    non_blank(value).unwrap_or_else(|| default.to_string())
}

/// 规范化单个变异
pub fn normalize_variant(raw: RawVariant) -> Variant {
    Variant {
        rsid: non_blank(raw.rsid),
        chromosome: non_blank(raw.chromosome),
        position: raw.position.unwrap_or(0),
        ref_allele: text_or(raw.r#ref, PLACEHOLDER),
        alt_allele: text_or(raw.alt, PLACEHOLDER),
        genotype: text_or(raw.genotype, PLACEHOLDER),
        star_allele: non_blank(raw.star_allele),
        filter: text_or(raw.filter, PLACEHOLDER),
        functional_impact: raw
            .functional_impact
            .as_deref()
            .and_then(FunctionalImpact::parse),
    }
}

fn clamp_confidence(score: Option<f64>) -> f64 {
    match score {
        Some(s) if s.is_finite() => s.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// 规范化单个药物结果
pub fn normalize_result(raw: RawAnalysisResult) -> AnalysisResult {
    let profile = raw.pharmacogenomic_profile.unwrap_or_default();
    let risk = raw.risk_assessment.unwrap_or_default();
    let rec = raw.clinical_recommendation.unwrap_or_default();
    let metrics = raw.quality_metrics.unwrap_or_default();

    let phenotype = text_or(profile.phenotype, UNKNOWN);

    let mirror = metrics.phenoconversion_detected.or(metrics.ui_phenoconversion);
    let (phenoconversion_occurred, phenoconversion_source) = match (risk.phenoconversion_occurred, mirror) {
        (Some(flag), _) => (flag, PhenoconversionSource::Canonical),
        (None, Some(flag)) => (flag, PhenoconversionSource::Mirror),
        (None, None) => (false, PhenoconversionSource::Absent),
    };

    let llm_explanation = raw.llm_explanation.and_then(|e| {
        let summary = non_blank(e.summary);
        let mechanism = non_blank(e.mechanism);
        let guideline = non_blank(e.guideline_recommendation);
        if summary.is_none() && mechanism.is_none() && guideline.is_none() {
            return None;
        }
        Some(LlmExplanation {
            summary: summary.unwrap_or_else(|| PLACEHOLDER.to_string()),
            mechanism: mechanism.unwrap_or_else(|| PLACEHOLDER.to_string()),
            guideline_recommendation: guideline.unwrap_or_else(|| PLACEHOLDER.to_string()),
            phenoconversion_explanation: non_blank(e.phenoconversion_explanation),
        })
    });

    AnalysisResult {
        drug: text_or(raw.drug, UNKNOWN).to_ascii_uppercase(),
        patient_id: non_blank(raw.patient_id),
        timestamp: raw
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc)),
        pharmacogenomic_profile: PharmacogenomicProfile {
            primary_gene: non_blank(profile.primary_gene),
            diplotype: text_or(profile.diplotype, UNKNOWN),
            phenotype,
            genetic_phenotype: non_blank(profile.genetic_phenotype),
            active_inhibitor: non_blank(profile.active_inhibitor),
            detected_variants: profile
                .detected_variants
                .unwrap_or_default()
                .into_iter()
                .map(normalize_variant)
                .collect(),
        },
        risk_assessment: RiskAssessment {
            risk_label: text_or(risk.risk_label, UNKNOWN),
            severity: text_or(risk.severity, PLACEHOLDER),
            confidence_score: clamp_confidence(risk.confidence_score),
            phenoconversion_occurred,
        },
        clinical_recommendation: ClinicalRecommendation {
            action: text_or(rec.action, PLACEHOLDER),
            alternative_drugs: rec
                .alternative_drugs
                .unwrap_or_default()
                .into_iter()
                .filter_map(|d| non_blank(Some(d)))
                .collect(),
            evidence_level: text_or(rec.evidence_level, PLACEHOLDER),
            guideline_version: non_blank(rec.cpic_guideline_version),
            phenoconversion_note: non_blank(rec.phenoconversion_note),
        },
        llm_explanation,
        quality_metrics: QualityMetrics {
            vcf_parsing_success: metrics.vcf_parsing_success.unwrap_or(false),
            variants_detected: metrics.variants_detected.unwrap_or(0),
            genes_called_successfully: metrics.genes_called_successfully.unwrap_or_default(),
            genes_failed: metrics.genes_failed.unwrap_or_default(),
            phenoconversion_detected: mirror,
        },
        phenoconversion_source,
    }
}

/// 规范化服务端基因面板条目，没有基因名的条目丢弃
pub fn normalize_gene_panel_entry(raw: RawGenePanelEntry) -> Option<GenePanelEntry> {
    let gene = non_blank(raw.gene)?;
    let diplotype = text_or(raw.diplotype, UNKNOWN);
    let phenotype = text_or(raw.phenotype, UNKNOWN);
    let variants: Vec<Variant> = raw
        .variants
        .unwrap_or_default()
        .into_iter()
        .map(normalize_variant)
        .collect();
    let variant_count = raw.variant_count.unwrap_or(variants.len());
    let summary = non_blank(raw.summary)
        .unwrap_or_else(|| GenePanelEntry::describe(&diplotype, &phenotype, variant_count));

    Some(GenePanelEntry {
        gene,
        diplotype,
        phenotype,
        genetic_phenotype: non_blank(raw.genetic_phenotype),
        active_inhibitor: non_blank(raw.active_inhibitor),
        variant_count,
        variants,
        summary,
    })
}
