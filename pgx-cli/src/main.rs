//! PGx报告客户端命令行程序

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use pgx_admin::{init_logging, ClientConfig, ConfigManager};
use pgx_core::AnalysisOutcome;
use pgx_integration::ApiClient;
use pgx_report::{render_report, ReportView};
use pgx_workflow::{PipelineConfig, PipelineOrchestrator, UploadSession};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "pgx")]
#[command(about = "Pharmacogenomic drug-risk report client")]
struct Cli {
    /// 配置文件路径（TOML）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 覆盖服务端接口地址
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// 覆盖日志级别
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 上传VCF并分析所选药物
    Analyze(AnalyzeArgs),
    /// 按患者ID或编号查询历史结果
    Results {
        /// 患者ID或患者编号
        id_or_code: String,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// 列出支持的药物
    Drugs,
    /// 服务端健康检查
    Health,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// VCF文件路径
    #[arg(long)]
    vcf: Option<PathBuf>,

    /// 患者编号
    #[arg(short, long)]
    patient_code: Option<String>,

    /// 待分析药物，可重复或逗号分隔
    #[arg(short, long = "drug", value_delimiter = ',')]
    drugs: Vec<String>,

    /// 合并用药，可重复或逗号分隔
    #[arg(long = "co-med", value_delimiter = ',')]
    co_medications: Vec<String>,

    #[command(flatten)]
    view: ViewArgs,
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// 标准剂量，格式 DRUG=VALUE
    #[arg(long = "dose", value_parser = parse_dose)]
    doses: Vec<(String, String)>,

    /// 展开全部基因卡片和药物行
    #[arg(long)]
    expand: bool,
}

fn parse_dose(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((drug, value)) if !drug.trim().is_empty() => {
            Ok((drug.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected DRUG=VALUE, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut manager = ConfigManager::load(cli.config.as_deref())?;
    manager.apply_overrides(cli.base_url.clone(), cli.log_level.clone())?;
    let config = manager.config().clone();

    init_logging(&config.logging.level)?;
    info!("Using API at {}", config.api.base_url);

    let client = ApiClient::new(config.api.base_url.clone(), config.api.timeout())
        .context("Failed to create API client")?;

    match cli.command {
        Command::Analyze(args) => analyze(client, &config, args).await,
        Command::Results { id_or_code, view } => {
            let outcome = client
                .fetch_results(&id_or_code)
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            print_report(outcome, &view)
        }
        Command::Drugs => {
            for drug in client.supported_drugs_or_builtin().await {
                println!("{:<14} {}", drug.drug, drug.primary_gene);
            }
            Ok(())
        }
        Command::Health => {
            let health = client.health().await.map_err(|e| anyhow!(e.user_message()))?;
            println!("{}", health.status);
            if health.is_healthy() {
                Ok(())
            } else {
                Err(anyhow!("Server reported status '{}'", health.status))
            }
        }
    }
}

async fn analyze(client: ApiClient, config: &ClientConfig, args: AnalyzeArgs) -> Result<()> {
    let mut session = UploadSession::new(config.session.default_patient_code.clone());
    if let Some(code) = &args.patient_code {
        session.set_patient_code(code.clone());
    }
    if let Some(path) = &args.vcf {
        session
            .attach_path(path, config.session.max_upload_bytes())
            .map_err(|e| anyhow!(e.user_message()))?;
    }
    for drug in &args.drugs {
        session.select_drug(drug);
    }
    for drug in &args.co_medications {
        session.add_medication(drug);
    }

    let pipeline = PipelineConfig {
        tick_interval: config.pipeline.tick_interval(),
        completion_hold: config.pipeline.completion_hold(),
    };
    let mut orchestrator = PipelineOrchestrator::new(Arc::new(client), pipeline);
    let mut updates = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while let Some(state) = updates.recv().await {
            eprintln!("[{}/7] {}", state.stage.index(), state.stage.label());
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = orchestrator.submit(&session, &cancel).await;
    drop(orchestrator);
    let _ = progress.await;

    match result {
        Ok(outcome) => print_report(outcome, &args.view),
        Err(e) => {
            error!("Submission failed: {}", e);
            Err(anyhow!(e.user_message()))
        }
    }
}

fn print_report(outcome: AnalysisOutcome, view: &ViewArgs) -> Result<()> {
    let mut report = ReportView::from_outcome(outcome);
    if view.expand {
        report.view_mut().expand_all();
    }
    for (drug, value) in &view.doses {
        report
            .enter_dose(drug, value)
            .map_err(|e| anyhow!(e.user_message()))?;
    }

    print!("{}", render_report(&report));
    Ok(())
}
