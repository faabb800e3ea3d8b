//! 基因面板重建
//!
//! 服务端提供了非空基因面板时直接使用；否则按主要基因去重，
//! 由每个基因首次出现的结果决定该基因的条目。

use pgx_core::{AnalysisResult, GenePanelEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// 基因面板来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PanelSource {
    Server,
    Reconstructed,
}

/// 从结果列表重建基因面板，按首次出现顺序排列
pub fn reconstruct_gene_panel(results: &[AnalysisResult]) -> Vec<GenePanelEntry> {
    let mut seen = HashSet::new();
    let mut panel = Vec::new();

    for result in results {
        let gene = match result.primary_gene() {
            Some(gene) => gene,
            None => continue,
        };
        if !seen.insert(gene.to_string()) {
            continue;
        }

        let profile = &result.pharmacogenomic_profile;
        let variants = profile.detected_variants.clone();
        let variant_count = variants.len();
        panel.push(GenePanelEntry {
            gene: gene.to_string(),
            diplotype: profile.diplotype.clone(),
            phenotype: profile.phenotype.clone(),
            genetic_phenotype: profile.genetic_phenotype.clone(),
            active_inhibitor: profile.active_inhibitor.clone(),
            variant_count,
            variants,
            summary: GenePanelEntry::describe(&profile.diplotype, &profile.phenotype, variant_count),
        });
    }

    panel
}

/// 选择基因面板：服务端面板非空时原样使用，不做重建
pub fn resolve_gene_panel(
    server_panel: Option<Vec<GenePanelEntry>>,
    results: &[AnalysisResult],
) -> (Vec<GenePanelEntry>, PanelSource) {
    match server_panel {
        Some(panel) if !panel.is_empty() => (panel, PanelSource::Server),
        _ => {
            let panel = reconstruct_gene_panel(results);
            debug!("Reconstructed gene panel with {} genes from {} results", panel.len(), results.len());
            (panel, PanelSource::Reconstructed)
        }
    }
}
