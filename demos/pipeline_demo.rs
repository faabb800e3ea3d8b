//! 流水线演示程序
//!
//! 在本地启动一个模拟分析服务，提交VCF，打印阶段进度和最终报告

use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use pgx_core::VcfFile;
use pgx_integration::ApiClient;
use pgx_report::{render_report, ReportView};
use pgx_workflow::{PipelineConfig, PipelineOrchestrator, UploadSession};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

const SAMPLE_VCF: &str = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
22\t42128945\trs3892097\tC\tT\t.\tPASS\tGENE=CYP2D6;STAR=*4\n";

async fn analyze() -> Json<Value> {
    // 模拟服务端耗时
    tokio::time::sleep(Duration::from_millis(1200)).await;
    Json(json!({
        "success": true,
        "data": {
            "patient_code": "DEMO_001",
            "patient_id": "5f0c2d9e",
            "total_variants_parsed": 1,
            "results": [
                {
                    "drug": "CODEINE",
                    "pharmacogenomic_profile": {
                        "primary_gene": "CYP2D6", "diplotype": "*1/*4",
                        "phenotype": "PM", "genetic_phenotype": "IM",
                        "active_inhibitor": "FLUOXETINE",
                        "detected_variants": [
                            { "rsid": "rs3892097", "ref": "C", "alt": "T", "genotype": "0/1",
                              "star_allele": "*4", "filter": "PASS" }
                        ]
                    },
                    "risk_assessment": { "risk_label": "Ineffective", "severity": "high",
                                         "confidence_score": 0.92, "phenoconversion_occurred": true },
                    "clinical_recommendation": { "action": "Use an alternative analgesic.",
                                                 "alternative_drugs": ["MORPHINE"], "evidence_level": "A" },
                    "llm_generated_explanation": {
                        "summary": "Fluoxetine inhibits CYP2D6, so codeine is not activated.",
                        "mechanism": "CYP2D6 converts codeine to morphine.",
                        "guideline_recommendation": "CPIC recommends avoiding codeine in poor metabolizers."
                    }
                },
                {
                    "drug": "WARFARIN",
                    "pharmacogenomic_profile": { "primary_gene": "CYP2C9", "diplotype": "*1/*3", "phenotype": "IM" },
                    "risk_assessment": { "risk_label": "Adjust Dose", "confidence_score": 0.8 },
                    "clinical_recommendation": { "action": "Reduce the starting dose." }
                }
            ]
        }
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("PGx 流水线演示\n");

    // 1. 启动模拟服务
    let app = Router::new().route("/api/v1/analyze", post(analyze));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}/api/v1", listener.local_addr()?);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("mock server stopped: {e}");
        }
    });
    info!("Mock analysis server at {}", base_url);

    // 2. 准备上传会话
    let mut session = UploadSession::default();
    session.set_patient_code("DEMO_001");
    session.attach_file(VcfFile::new("demo.vcf", SAMPLE_VCF.as_bytes().to_vec(), 5 * 1024 * 1024)?);
    session.select_drug("codeine");
    session.select_drug("warfarin");
    session.add_medication("fluoxetine");

    // 3. 提交并打印阶段进度
    let client = ApiClient::new(base_url, Duration::from_secs(30))?;
    let mut orchestrator = PipelineOrchestrator::new(
        Arc::new(client),
        PipelineConfig::from_millis(300, 500),
    );
    let mut updates = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while let Some(state) = updates.recv().await {
            println!("  [{}/7] {}", state.stage.index(), state.stage.label());
        }
    });

    let outcome = orchestrator.submit(&session, &CancellationToken::new()).await?;
    drop(orchestrator);
    progress.await?;

    // 4. 构建报告并使用剂量计算器
    let mut report = ReportView::from_outcome(outcome);
    report.view_mut().expand_all();
    let dose = report.enter_dose("WARFARIN", "5")?;
    println!("\nWARFARIN 5 mg -> {}\n", dose.display());

    print!("{}", render_report(&report));
    Ok(())
}
