//! 上传会话
//!
//! 提交前的表单状态。提交失败时会话保持不变，用户可以直接重试。

use pgx_core::utils::normalize_drug_id;
use pgx_core::{AnalyzeRequest, PgxError, Result, VcfFile, DEFAULT_PATIENT_CODE};
use std::collections::BTreeSet;
use std::path::Path;

/// 阻止提交的前置条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionBlocker {
    MissingFile,
    NoDrugSelected,
}

impl SubmissionBlocker {
    pub fn message(&self) -> &'static str {
        match self {
            SubmissionBlocker::MissingFile => "Please upload a VCF file.",
            SubmissionBlocker::NoDrugSelected => "Please select at least one drug.",
        }
    }
}

/// 上传会话
#[derive(Debug, Clone)]
pub struct UploadSession {
    patient_code: String,
    default_patient_code: String,
    file: Option<VcfFile>,
    selected_drugs: BTreeSet<String>,
    concurrent_medications: BTreeSet<String>,
}

impl UploadSession {
    pub fn new(default_patient_code: impl Into<String>) -> Self {
        let default_patient_code = default_patient_code.into();
        Self {
            patient_code: default_patient_code.clone(),
            default_patient_code,
            file: None,
            selected_drugs: BTreeSet::new(),
            concurrent_medications: BTreeSet::new(),
        }
    }

    pub fn set_patient_code(&mut self, code: impl Into<String>) {
        self.patient_code = code.into();
    }

    /// 实际提交的患者编号，为空时使用默认值
    pub fn patient_code(&self) -> &str {
        let trimmed = self.patient_code.trim();
        if trimmed.is_empty() {
            &self.default_patient_code
        } else {
            trimmed
        }
    }

    /// 设置VCF文件，最多一个，返回被替换的旧文件
    pub fn attach_file(&mut self, file: VcfFile) -> Option<VcfFile> {
        self.file.replace(file)
    }

    /// 从路径加载VCF文件，失败时保留原有文件
    pub fn attach_path(&mut self, path: impl AsRef<Path>, max_bytes: usize) -> Result<()> {
        let file = VcfFile::from_path(path, max_bytes)?;
        self.attach_file(file);
        Ok(())
    }

    pub fn clear_file(&mut self) -> Option<VcfFile> {
        self.file.take()
    }

    pub fn file(&self) -> Option<&VcfFile> {
        self.file.as_ref()
    }

    pub fn select_drug(&mut self, drug: &str) -> bool {
        normalize_drug_id(drug)
            .map(|id| self.selected_drugs.insert(id))
            .unwrap_or(false)
    }

    pub fn deselect_drug(&mut self, drug: &str) -> bool {
        normalize_drug_id(drug)
            .map(|id| self.selected_drugs.remove(&id))
            .unwrap_or(false)
    }

    /// 切换药物选择，返回切换后是否选中
    pub fn toggle_drug(&mut self, drug: &str) -> bool {
        match normalize_drug_id(drug) {
            Some(id) if self.selected_drugs.remove(&id) => false,
            Some(id) => self.selected_drugs.insert(id),
            None => false,
        }
    }

    pub fn selected_drugs(&self) -> &BTreeSet<String> {
        &self.selected_drugs
    }

    pub fn add_medication(&mut self, drug: &str) -> bool {
        normalize_drug_id(drug)
            .map(|id| self.concurrent_medications.insert(id))
            .unwrap_or(false)
    }

    pub fn remove_medication(&mut self, drug: &str) -> bool {
        normalize_drug_id(drug)
            .map(|id| self.concurrent_medications.remove(&id))
            .unwrap_or(false)
    }

    pub fn toggle_medication(&mut self, drug: &str) -> bool {
        match normalize_drug_id(drug) {
            Some(id) if self.concurrent_medications.remove(&id) => false,
            Some(id) => self.concurrent_medications.insert(id),
            None => false,
        }
    }

    pub fn concurrent_medications(&self) -> &BTreeSet<String> {
        &self.concurrent_medications
    }

    /// 所有未满足的前置条件
    pub fn blockers(&self) -> Vec<SubmissionBlocker> {
        let mut blockers = Vec::new();
        if self.file.is_none() {
            blockers.push(SubmissionBlocker::MissingFile);
        }
        if self.selected_drugs.is_empty() {
            blockers.push(SubmissionBlocker::NoDrugSelected);
        }
        blockers
    }

    pub fn can_submit(&self) -> bool {
        self.blockers().is_empty()
    }

    /// 提交校验，失败消息列出缺失的前置条件
    pub fn validate(&self) -> Result<()> {
        match self.blockers().as_slice() {
            [] => Ok(()),
            [single] => Err(PgxError::Validation(single.message().to_string())),
            _ => Err(PgxError::Validation(
                "Please upload a VCF file and select at least one drug.".to_string(),
            )),
        }
    }

    /// 生成分析请求，会话本身不被消耗
    pub fn to_request(&self) -> Result<AnalyzeRequest> {
        self.validate()?;
        let file = self
            .file
            .clone()
            .ok_or_else(|| PgxError::Validation(SubmissionBlocker::MissingFile.message().to_string()))?;

        Ok(AnalyzeRequest {
            patient_code: self.patient_code().to_string(),
            file,
            drugs: self.selected_drugs.iter().cloned().collect(),
            concurrent_medications: self.concurrent_medications.iter().cloned().collect(),
        })
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new(DEFAULT_PATIENT_CODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vcf() -> VcfFile {
        VcfFile::new("patient.vcf", b"##fileformat=VCFv4.2\n".to_vec(), 1024).unwrap()
    }

    #[test]
    fn test_submission_blocked_without_file_or_drug() {
        let mut session = UploadSession::default();
        assert_eq!(
            session.blockers(),
            vec![SubmissionBlocker::MissingFile, SubmissionBlocker::NoDrugSelected]
        );
        let err = session.validate().unwrap_err();
        assert_eq!(err.to_string(), "Please upload a VCF file and select at least one drug.");

        session.attach_file(vcf());
        assert_eq!(session.validate().unwrap_err().to_string(), "Please select at least one drug.");

        session.clear_file();
        session.select_drug("warfarin");
        assert_eq!(session.validate().unwrap_err().to_string(), "Please upload a VCF file.");

        session.attach_file(vcf());
        assert!(session.can_submit());
    }

    #[test]
    fn test_drug_selection_is_normalized() {
        let mut session = UploadSession::default();
        assert!(session.select_drug(" codeine "));
        assert!(!session.select_drug("CODEINE"));
        assert!(!session.select_drug("  "));
        assert!(!session.toggle_drug("Codeine"));
        assert!(session.selected_drugs().is_empty());
        assert!(session.toggle_medication("fluoxetine"));
        assert!(session.concurrent_medications().contains("FLUOXETINE"));
    }

    #[test]
    fn test_patient_code_default() {
        let mut session = UploadSession::default();
        assert_eq!(session.patient_code(), DEFAULT_PATIENT_CODE);
        session.set_patient_code("  PT-7 ");
        assert_eq!(session.patient_code(), "PT-7");
        session.set_patient_code("");
        assert_eq!(session.patient_code(), DEFAULT_PATIENT_CODE);
    }

    #[test]
    fn test_to_request_keeps_session() {
        let mut session = UploadSession::default();
        session.set_patient_code("PT-7");
        session.attach_file(vcf());
        session.select_drug("WARFARIN");
        session.select_drug("CODEINE");

        let request = session.to_request().unwrap();
        assert_eq!(request.patient_code, "PT-7");
        assert_eq!(request.drugs, vec!["CODEINE".to_string(), "WARFARIN".to_string()]);
        assert!(request.concurrent_medications.is_empty());
        assert!(session.file().is_some());
    }

    #[test]
    fn test_bad_path_keeps_existing_file() {
        let mut session = UploadSession::default();
        session.attach_file(vcf());
        assert!(session.attach_path("notes.txt", 1024).is_err());
        assert_eq!(session.file().unwrap().file_name(), "patient.vcf");
    }
}
