//! 核心数据模型定义
//!
//! 这里的类型都是规范化之后的结果，缺失字段已经替换为固定的默认值，
//! 下游渲染不再需要逐字段兜底。服务端原始报文见 [`crate::wire`]。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PgxError, Result};
use crate::utils::join_identifiers;

/// 未知的基因型/表型/风险标签
pub const UNKNOWN: &str = "Unknown";

/// 缺失展示文本的占位符
pub const PLACEHOLDER: &str = "—";

/// 默认患者编号
pub const DEFAULT_PATIENT_CODE: &str = "PATIENT_001";

/// 变异功能影响
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FunctionalImpact {
    LossOfFunction,
    ReducedFunction,
    NormalFunction,
}

impl FunctionalImpact {
    /// 解析服务端的功能影响字符串，无法识别时返回 None
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "loss_of_function" => Some(Self::LossOfFunction),
            "reduced_function" | "decreased_function" => Some(Self::ReducedFunction),
            "normal_function" => Some(Self::NormalFunction),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LossOfFunction => "loss_of_function",
            Self::ReducedFunction => "reduced_function",
            Self::NormalFunction => "normal_function",
        }
    }
}

/// 检出的变异
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    pub rsid: Option<String>,
    pub chromosome: Option<String>,
    pub position: i64,
    pub ref_allele: String,
    pub alt_allele: String,
    pub genotype: String,
    pub star_allele: Option<String>,
    pub filter: String,
    pub functional_impact: Option<FunctionalImpact>,
}

impl Variant {
    /// 是否通过了VCF的FILTER质控
    pub fn passed_filter(&self) -> bool {
        self.filter.eq_ignore_ascii_case("PASS")
    }
}

/// 药物基因组学概况
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PharmacogenomicProfile {
    /// 主要基因，缺失时该结果不参与基因面板
    pub primary_gene: Option<String>,
    pub diplotype: String,
    /// 临床表型（考虑合并用药后的有效表型）
    pub phenotype: String,
    /// 遗传表型（仅由双倍型决定），服务端未提供时为空
    pub genetic_phenotype: Option<String>,
    pub active_inhibitor: Option<String>,
    pub detected_variants: Vec<Variant>,
}

/// 风险评估
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    /// 风险标签，缺失时为 "Unknown"
    pub risk_label: String,
    pub severity: String,
    /// 置信度，已限制在 [0, 1]
    pub confidence_score: f64,
    pub phenoconversion_occurred: bool,
}

/// 临床建议
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicalRecommendation {
    pub action: String,
    pub alternative_drugs: Vec<String>,
    pub evidence_level: String,
    pub guideline_version: Option<String>,
    pub phenoconversion_note: Option<String>,
}

/// 自然语言解释
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmExplanation {
    pub summary: String,
    pub mechanism: String,
    pub guideline_recommendation: String,
    pub phenoconversion_explanation: Option<String>,
}

/// 质量指标
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    pub vcf_parsing_success: bool,
    pub variants_detected: u64,
    pub genes_called_successfully: Vec<String>,
    pub genes_failed: Vec<String>,
    /// 表型转换标志的镜像字段（已弃用，仅用于比对）
    pub phenoconversion_detected: Option<bool>,
}

/// 表型转换标志的来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PhenoconversionSource {
    /// risk_assessment.phenoconversion_occurred
    Canonical,
    /// quality_metrics 中的镜像字段
    Mirror,
    /// 两处都没有提供
    Absent,
}

/// 单个药物的分析结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub drug: String,
    pub patient_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub pharmacogenomic_profile: PharmacogenomicProfile,
    pub risk_assessment: RiskAssessment,
    pub clinical_recommendation: ClinicalRecommendation,
    pub llm_explanation: Option<LlmExplanation>,
    pub quality_metrics: QualityMetrics,
    pub phenoconversion_source: PhenoconversionSource,
}

impl AnalysisResult {
    pub fn primary_gene(&self) -> Option<&str> {
        self.pharmacogenomic_profile.primary_gene.as_deref()
    }
}

/// 基因面板条目，每个基因最多一条
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenePanelEntry {
    pub gene: String,
    pub diplotype: String,
    pub phenotype: String,
    pub genetic_phenotype: Option<String>,
    pub active_inhibitor: Option<String>,
    pub variant_count: usize,
    pub variants: Vec<Variant>,
    pub summary: String,
}

impl GenePanelEntry {
    /// 生成基因卡片的摘要文本
    pub fn describe(diplotype: &str, phenotype: &str, variant_count: usize) -> String {
        let noun = if variant_count == 1 { "variant" } else { "variants" };
        format!("{diplotype} diplotype, {phenotype} phenotype, {variant_count} {noun} detected")
    }
}

/// 上传元数据，随结果一起交给报告视图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UploadMetadata {
    pub patient_code: String,
    /// 服务端分配的不透明患者ID
    pub patient_id: Option<String>,
    pub total_variants_parsed: u64,
    pub file_name: Option<String>,
}

/// 一次分析（或按ID查询）的完整返回
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisOutcome {
    pub metadata: UploadMetadata,
    pub results: Vec<AnalysisResult>,
    /// 服务端提供的基因面板；None 或空表示需要客户端重建
    pub gene_panel: Option<Vec<GenePanelEntry>>,
}

/// 支持的药物
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupportedDrug {
    pub drug: String,
    pub primary_gene: String,
}

impl SupportedDrug {
    /// 服务端不可达时使用的内置药物列表
    pub fn builtin() -> Vec<SupportedDrug> {
        [
            ("CODEINE", "CYP2D6"),
            ("WARFARIN", "CYP2C9"),
            ("CLOPIDOGREL", "CYP2C19"),
            ("SIMVASTATIN", "SLCO1B1"),
            ("AZATHIOPRINE", "TPMT"),
            ("FLUOROURACIL", "DPYD"),
        ]
        .into_iter()
        .map(|(drug, gene)| SupportedDrug {
            drug: drug.to_string(),
            primary_gene: gene.to_string(),
        })
        .collect()
    }
}

/// 单独上传VCF的回执
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadReceipt {
    pub vcf_upload_id: String,
    pub patient_id: String,
    pub patient_code: String,
    pub parsing_status: String,
    #[serde(default)]
    pub total_variants_found: u64,
    #[serde(default)]
    pub genes_detected: Vec<String>,
}

/// 待上传的VCF文件
#[derive(Clone, PartialEq, Eq)]
pub struct VcfFile {
    file_name: String,
    content: Vec<u8>,
}

impl VcfFile {
    /// 创建文件句柄，只接受 .vcf 扩展名且不超过大小上限
    pub fn new(file_name: impl Into<String>, content: Vec<u8>, max_bytes: usize) -> Result<Self> {
        let file_name = file_name.into();
        if !file_name.to_ascii_lowercase().ends_with(".vcf") {
            return Err(PgxError::Validation(format!(
                "Only .vcf files are accepted (got '{file_name}')"
            )));
        }
        if content.len() > max_bytes {
            return Err(PgxError::Validation(format!(
                "File exceeds {} MB limit",
                max_bytes / (1024 * 1024)
            )));
        }
        Ok(Self { file_name, content })
    }

    /// 从磁盘读取VCF文件
    pub fn from_path(path: impl AsRef<Path>, max_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PgxError::Validation(format!("Invalid file path: {}", path.display())))?
            .to_string();
        if !file_name.to_ascii_lowercase().ends_with(".vcf") {
            return Err(PgxError::Validation(format!(
                "Only .vcf files are accepted (got '{file_name}')"
            )));
        }
        if std::fs::metadata(path)?.len() > max_bytes as u64 {
            return Err(PgxError::Validation(format!(
                "File exceeds {} MB limit",
                max_bytes / (1024 * 1024)
            )));
        }
        let content = std::fs::read(path)?;
        Self::new(file_name, content, max_bytes)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

// 不打印文件内容
impl std::fmt::Debug for VcfFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcfFile")
            .field("file_name", &self.file_name)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// 上传并分析请求
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeRequest {
    pub patient_code: String,
    pub file: VcfFile,
    pub drugs: Vec<String>,
    pub concurrent_medications: Vec<String>,
}

impl AnalyzeRequest {
    /// 表单字段 drugs：逗号拼接
    pub fn drugs_field(&self) -> String {
        join_identifiers(&self.drugs)
    }

    /// 表单字段 concurrent_medications：逗号拼接，可为空串
    pub fn concurrent_medications_field(&self) -> String {
        join_identifiers(&self.concurrent_medications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    #[test]
    fn test_vcf_extension_check() {
        assert!(VcfFile::new("sample.vcf", b"##fileformat=VCFv4.2".to_vec(), MB).is_ok());
        assert!(VcfFile::new("SAMPLE.VCF", Vec::new(), MB).is_ok());

        let err = VcfFile::new("sample.txt", Vec::new(), MB).unwrap_err();
        assert!(matches!(err, PgxError::Validation(_)));
    }

    #[test]
    fn test_vcf_size_limit() {
        let err = VcfFile::new("big.vcf", vec![0u8; 2 * MB], MB).unwrap_err();
        assert_eq!(err.to_string(), "File exceeds 1 MB limit");
    }

    #[test]
    fn test_vcf_debug_hides_content() {
        let file = VcfFile::new("p.vcf", b"secret".to_vec(), MB).unwrap();
        let debug = format!("{:?}", file);
        assert!(debug.contains("p.vcf"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_analyze_request_fields() {
        let request = AnalyzeRequest {
            patient_code: "PT-7".to_string(),
            file: VcfFile::new("p.vcf", Vec::new(), MB).unwrap(),
            drugs: vec!["CODEINE".to_string(), "WARFARIN".to_string()],
            concurrent_medications: Vec::new(),
        };
        assert_eq!(request.drugs_field(), "CODEINE,WARFARIN");
        assert_eq!(request.concurrent_medications_field(), "");
    }

    #[test]
    fn test_functional_impact_parse() {
        assert_eq!(FunctionalImpact::parse("loss_of_function"), Some(FunctionalImpact::LossOfFunction));
        assert_eq!(FunctionalImpact::parse("Reduced Function"), Some(FunctionalImpact::ReducedFunction));
        assert_eq!(FunctionalImpact::parse("weird"), None);
    }

    #[test]
    fn test_gene_summary_text() {
        assert_eq!(
            GenePanelEntry::describe("*1/*4", "IM", 1),
            "*1/*4 diplotype, IM phenotype, 1 variant detected"
        );
    }
}
