//! 分析服务端HTTP客户端
//!
//! 不论HTTP状态码如何都先按 `{success, data, error}` 信封解析响应体，
//! 服务端给出的失败消息原样返回；传输层错误统一映射为 [`PgxError::Network`]。

use std::time::Duration;

use async_trait::async_trait;
use pgx_core::error::GENERIC_FAILURE_MESSAGE;
use pgx_core::wire::{ApiEnvelope, RawSupportedDrug, ResultsPayload};
use pgx_core::{
    AnalysisBackend, AnalysisOutcome, AnalyzeRequest, PgxError, Result, SupportedDrug,
    UploadReceipt, VcfFile,
};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

/// 健康检查返回
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// 分析服务端客户端
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// 创建客户端，`base_url` 形如 `http://localhost:8000/api/v1`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(PgxError::Config("API base URL is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pgx-report-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PgxError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// 仅上传VCF，返回解析回执
    pub async fn upload(&self, file: &VcfFile, patient_code: &str) -> Result<UploadReceipt> {
        info!("Uploading {} ({} bytes) for patient {}", file.file_name(), file.len(), patient_code);

        let form = Form::new()
            .part("vcf_file", vcf_part(file))
            .text("patient_code", patient_code.to_string());

        let response = self
            .client
            .post(self.url("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        read_envelope::<UploadReceipt>(response).await
    }

    /// 上传并分析，一次往返
    pub async fn upload_and_analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisOutcome> {
        debug!(
            "POST analyze: patient={} drugs=[{}] co-medications=[{}]",
            request.patient_code,
            request.drugs_field(),
            request.concurrent_medications_field()
        );

        let form = Form::new()
            .part("vcf_file", vcf_part(&request.file))
            .text("patient_code", request.patient_code.clone())
            .text("drugs", request.drugs_field())
            .text("concurrent_medications", request.concurrent_medications_field());

        let response = self
            .client
            .post(self.url("analyze"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let payload = read_envelope::<ResultsPayload>(response).await?;
        Ok(payload.into_outcome(&request.patient_code))
    }

    /// 按患者ID或患者编号查询结果，服务端不提供基因面板时由报告视图重建
    pub async fn fetch_results(&self, id_or_code: &str) -> Result<AnalysisOutcome> {
        let key = id_or_code.trim();
        if key.is_empty() {
            return Err(PgxError::Validation("Please enter a patient ID or code.".to_string()));
        }

        let mut url = reqwest::Url::parse(&self.url("results"))
            .map_err(|e| PgxError::Config(format!("invalid API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| PgxError::Config(format!("invalid API base URL: {}", self.base_url)))?
            .push(key);

        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(transport_error)?;

        let payload = read_envelope::<ResultsPayload>(response).await?;
        Ok(payload.into_outcome(key))
    }

    /// 服务端支持的药物列表
    pub async fn supported_drugs(&self) -> Result<Vec<SupportedDrug>> {
        let response = self
            .client
            .get(self.url("supported-drugs"))
            .send()
            .await
            .map_err(transport_error)?;

        let drugs = read_envelope::<Vec<RawSupportedDrug>>(response).await?;
        Ok(drugs
            .into_iter()
            .filter(|d| !d.drug.trim().is_empty())
            .map(SupportedDrug::from)
            .collect())
    }

    /// 获取支持的药物，服务端不可用或返回空列表时使用内置列表
    pub async fn supported_drugs_or_builtin(&self) -> Vec<SupportedDrug> {
        match self.supported_drugs().await {
            Ok(drugs) if !drugs.is_empty() => drugs,
            Ok(_) => {
                warn!("Server returned no supported drugs, using built-in list");
                SupportedDrug::builtin()
            }
            Err(e) => {
                warn!("Failed to load supported drugs, using built-in list: {}", e);
                SupportedDrug::builtin()
            }
        }
    }

    /// 健康检查
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .client
            .get(self.url("health"))
            .send()
            .await
            .map_err(transport_error)?;

        read_envelope::<HealthStatus>(response).await
    }
}

#[async_trait]
impl AnalysisBackend for ApiClient {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisOutcome> {
        self.upload_and_analyze(&request).await
    }
}

fn vcf_part(file: &VcfFile) -> Part {
    Part::bytes(file.content().to_vec()).file_name(file.file_name().to_string())
}

fn transport_error(err: reqwest::Error) -> PgxError {
    error!("HTTP request failed: {}", err);
    if err.is_timeout() {
        PgxError::Network("request timed out".to_string())
    } else {
        PgxError::Network(err.to_string())
    }
}

/// 读取响应体并按信封解析
async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await.map_err(transport_error)?;

    let envelope = match serde_json::from_slice::<ApiEnvelope<T>>(&body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => {
            warn!("Server returned {} with a malformed body: {}", status, e);
            return Err(PgxError::Serialization(e));
        }
        Err(_) => {
            warn!("Server returned {} without a readable body", status);
            return Err(PgxError::Api(GENERIC_FAILURE_MESSAGE.to_string()));
        }
    };

    if !status.is_success() {
        let message = envelope.failure_message();
        warn!("Server returned {}: {}", status, message);
        return Err(PgxError::Api(message));
    }

    envelope.into_result()
}
