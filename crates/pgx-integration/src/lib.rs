//! # PGx集成模块
//!
//! 与分析服务端的HTTP集成：
//! - 上传VCF并分析（multipart表单）
//! - 按患者ID或患者编号查询历史结果
//! - 支持药物列表与健康检查
//!
//! [`ApiClient`] 实现了 [`pgx_core::AnalysisBackend`]，可直接交给流水线编排器使用。

pub mod client;

pub use client::{ApiClient, HealthStatus};
