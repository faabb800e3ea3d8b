//! 配置管理
//!
//! 加载顺序：内置默认值 → 可选的TOML配置文件 → `PGX_` 前缀环境变量
//! （层级用 `__` 分隔，例如 `PGX_API__BASE_URL`）。加载后统一校验。

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// 客户端完整配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// 服务端接口
    pub api: ApiConfig,
    /// 进度流水线
    pub pipeline: PipelineSettings,
    /// 上传会话
    pub session: SessionConfig,
    /// 日志
    pub logging: LoggingConfig,
}

/// 服务端接口配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// 接口根地址
    pub base_url: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 进度流水线配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// 模拟阶段推进间隔（毫秒）
    pub tick_interval_ms: u64,
    /// 完成后停留时间（毫秒）
    pub completion_hold_ms: u64,
}

impl PipelineSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn completion_hold(&self) -> Duration {
        Duration::from_millis(self.completion_hold_ms)
    }
}

/// 上传会话配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// 未填写时使用的患者编号
    pub default_patient_code: String,
    /// VCF文件大小上限（MB），与服务端一致
    pub max_upload_mb: u64,
}

impl SessionConfig {
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1500,
            completion_hold_ms: 800,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_patient_code: "PATIENT_001".to_string(),
            max_upload_mb: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: ClientConfig,
    /// 配置文件路径
    config_path: Option<PathBuf>,
    /// 配置验证器
    validator: ConfigValidator,
}

impl ConfigManager {
    /// 加载并校验配置
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = Self::load_config(config_path, Self::environment())?;
        Self::with_config(config, config_path.map(Path::to_path_buf))
    }

    /// 使用已有配置创建管理器
    pub fn with_config(config: ClientConfig, config_path: Option<PathBuf>) -> Result<Self> {
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config,
            config_path,
            validator,
        })
    }

    fn environment() -> Environment {
        Environment::with_prefix("PGX")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_config(config_path: Option<&Path>, env: Environment) -> Result<ClientConfig> {
        let defaults = Config::try_from(&ClientConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(env)
            .build()
            .context("Failed to load configuration")?;

        let config: ClientConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded from: {}", path.display()),
            None => debug!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// 应用命令行覆盖项后重新校验，失败时保留原配置
    pub fn apply_overrides(&mut self, base_url: Option<String>, log_level: Option<String>) -> Result<()> {
        let mut updated = self.config.clone();
        if let Some(url) = base_url {
            updated.api.base_url = url;
        }
        if let Some(level) = log_level {
            updated.logging.level = level;
        }

        self.validator.validate(&updated)?;
        self.config = updated;
        Ok(())
    }

    /// 验证配置
    pub fn validate_config(&self) -> Result<()> {
        self.validator.validate(&self.config)
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&ClientConfig) -> Result<()>,
    /// 错误消息
    error_message: &'static str,
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "api.base_url",
                validator: |config| {
                    let url = config.api.base_url.trim();
                    if url.is_empty() {
                        Err(anyhow::anyhow!("API base URL cannot be empty"))
                    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
                        Err(anyhow::anyhow!("API base URL must start with http:// or https:// (got '{url}')"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid API base URL",
            },
            ValidationRule {
                field_path: "api.timeout_secs",
                validator: |config| {
                    if config.api.timeout_secs == 0 {
                        Err(anyhow::anyhow!("Request timeout cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid request timeout",
            },
            ValidationRule {
                field_path: "pipeline.tick_interval_ms",
                validator: |config| {
                    if config.pipeline.tick_interval_ms == 0 {
                        Err(anyhow::anyhow!("Tick interval cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid pipeline tick interval",
            },
            ValidationRule {
                field_path: "session.default_patient_code",
                validator: |config| {
                    if config.session.default_patient_code.trim().is_empty() {
                        Err(anyhow::anyhow!("Default patient code cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid default patient code",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &ClientConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env() -> Environment {
        ConfigManager::environment().source(Some(HashMap::new()))
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        ConfigManager::environment().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = ConfigManager::load_config(None, no_env()).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.api.base_url, "http://localhost:8000/api/v1");
        assert_eq!(config.api.timeout(), Duration::from_secs(120));
        assert_eq!(config.pipeline.tick_interval(), Duration::from_millis(1500));
        assert_eq!(config.session.max_upload_bytes(), 5 * 1024 * 1024);
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[test]
    fn test_file_then_env_layering() {
        let path = std::env::temp_dir().join(format!("pgx-client-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[api]\nbase_url = \"http://file.example/api/v1\"\ntimeout_secs = 30\n\n[pipeline]\ntick_interval_ms = 250\n",
        )
        .unwrap();

        let config = ConfigManager::load_config(
            Some(&path),
            env(&[("PGX_API__BASE_URL", "https://env.example/api/v1")]),
        )
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.api.base_url, "https://env.example/api/v1");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.pipeline.tick_interval_ms, 250);
        assert_eq!(config.pipeline.completion_hold_ms, 800);
    }

    #[test]
    fn test_missing_file_is_error() {
        let path = std::env::temp_dir().join("pgx-client-does-not-exist.toml");
        assert!(ConfigManager::load_config(Some(&path), no_env()).is_err());
    }

    #[test]
    fn test_validation_rules() {
        let validator = ConfigValidator::new();

        let mut config = ClientConfig::default();
        config.api.base_url = "localhost:8000".to_string();
        let err = validator.validate(&config).unwrap_err();
        assert!(err.to_string().starts_with("Invalid API base URL"));

        let mut config = ClientConfig::default();
        config.pipeline.tick_interval_ms = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = ClientConfig::default();
        config.api.timeout_secs = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = ClientConfig::default();
        config.session.default_patient_code = "  ".to_string();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut manager = ConfigManager::with_config(ClientConfig::default(), None).unwrap();

        manager
            .apply_overrides(Some("http://127.0.0.1:9000/api/v1".to_string()), Some("debug".to_string()))
            .unwrap();
        assert_eq!(manager.config().api.base_url, "http://127.0.0.1:9000/api/v1");
        assert_eq!(manager.config().logging.level, "debug");

        assert!(manager.apply_overrides(Some(String::new()), None).is_err());
        assert_eq!(manager.config().api.base_url, "http://127.0.0.1:9000/api/v1");
    }
}
