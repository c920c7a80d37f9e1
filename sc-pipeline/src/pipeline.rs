//! The end-to-end analysis pipeline: load, QC, normalize, select, embed,
//! cluster, annotate, rank, export.

use anyhow::{ensure, Context, Error};
use log::info;
use sc_types::AnnMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::diff_exp::DiffExpMethod;
use crate::hvg::HvgParams;
use crate::qc::QcFilters;

/// Every knob of the pipeline, deserializable from JSON with per-field
/// defaults. The defaults reproduce a standard PBMC workflow.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gene symbol prefix marking mitochondrial genes.
    pub mito_prefix: String,
    /// QC thresholds.
    pub qc: QcFilters,
    /// Per-cell target count sum; `None` scales to the median.
    pub target_sum: Option<f64>,
    /// Highly-variable gene selection parameters.
    pub hvg: HvgParams,
    /// Number of principal components.
    pub n_comps: usize,
    /// Clip standardized expression above this value before PCA.
    pub max_scaled_value: f64,
    /// Neighbors per cell in the kNN graph.
    pub n_neighbors: usize,
    /// Number of principal components fed to the neighbor search.
    pub n_pcs: usize,
    /// Louvain resolution.
    pub resolution: f64,
    /// UMAP minimum distance.
    pub min_dist: f64,
    /// Marker-gene scoring method.
    pub method: DiffExpMethod,
    /// Random seed for clustering and embedding.
    pub seed: u64,
    /// Cluster label to cell-type mapping; annotation is skipped when empty.
    pub cell_types: BTreeMap<String, String>,
    /// Tag appended to every exported file stem, e.g. `_run1`.
    pub out_suffix: String,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            mito_prefix: crate::qc::MITO_PREFIX.to_string(),
            qc: QcFilters::default(),
            target_sum: Some(1e4),
            hvg: HvgParams::default(),
            n_comps: 50,
            max_scaled_value: 10.0,
            n_neighbors: 10,
            n_pcs: 40,
            resolution: 1.0,
            min_dist: 0.5,
            method: DiffExpMethod::Wilcoxon,
            seed: 0,
            cell_types: BTreeMap::new(),
            out_suffix: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<PipelineConfig, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Run the full analysis on the matrix directory at `input`. When `out` is
/// given, everything is exported there as flat files. Returns the annotated
/// matrix.
pub fn run(input: impl AsRef<Path>, out: Option<&Path>, config: &PipelineConfig) -> Result<AnnMatrix, Error> {
    let mut adata = crate::mtx::load_mtx_dir(input).context("loading counts")?;
    ensure!(adata.n_obs() > 0 && adata.n_vars() > 0, "input matrix is empty");
    info!("starting pipeline on {} cells x {} genes", adata.n_obs(), adata.n_vars());

    crate::qc::compute_qc_metrics(&mut adata, &config.mito_prefix).context("computing QC metrics")?;
    let mut adata = crate::qc::apply_filters(adata, &config.qc).context("applying QC filters")?;

    crate::normalization::normalize_total(&mut adata, config.target_sum).context("normalizing counts")?;
    crate::normalization::log1p(&mut adata).context("log-transforming")?;

    crate::hvg::highly_variable_genes(&mut adata, &config.hvg).context("selecting variable genes")?;
    let mut adata = crate::hvg::subset_to_highly_variable(adata).context("subsetting to variable genes")?;

    let n_comps = config.n_comps.min(adata.n_obs().min(adata.n_vars()));
    crate::dim_red::pca(&mut adata, n_comps, config.max_scaled_value).context("running PCA")?;

    let n_pcs = config.n_pcs.min(n_comps);
    crate::nn::neighbors(&mut adata, config.n_neighbors, n_pcs).context("building neighbor graphs")?;

    crate::cluster::louvain_cluster(&mut adata, config.resolution, config.seed).context("clustering")?;
    crate::embed::umap(&mut adata, config.min_dist, config.seed).context("computing UMAP")?;

    if !config.cell_types.is_empty() {
        crate::annotate::annotate_clusters(&mut adata, "louvain", &config.cell_types, "cell_type")
            .context("annotating clusters")?;
    }

    crate::diff_exp::rank_genes_groups(&mut adata, "louvain", config.method, None)
        .context("ranking marker genes")?;

    if let Some(out) = out {
        crate::export::export_all(&adata, out, &config.out_suffix).context("exporting results")?;
    }
    Ok(adata)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.qc.min_genes, 200);
        assert_eq!(config.qc.max_genes, 2500);
        assert_eq!(config.qc.min_cells, 3);
        assert_eq!(config.qc.max_pct_mt, 5.0);
        assert_eq!(config.target_sum, Some(1e4));
        assert_eq!(config.n_comps, 50);
        assert_eq!(config.n_neighbors, 10);
        assert_eq!(config.n_pcs, 40);
        assert_eq!(config.resolution, 1.0);
        assert_eq!(config.method, DiffExpMethod::Wilcoxon);
        assert_eq!(config.seed, 0);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"n_neighbors": 15, "qc": {"min_genes": 100}}"#).unwrap();
        assert_eq!(config.n_neighbors, 15);
        assert_eq!(config.qc.min_genes, 100);
        // untouched fields keep their defaults
        assert_eq!(config.qc.max_genes, 2500);
        assert_eq!(config.n_pcs, 40);
    }

    #[test]
    fn test_method_parses_from_json() {
        let config: PipelineConfig = serde_json::from_str(r#"{"method": "t_test"}"#).unwrap();
        assert_eq!(config.method, DiffExpMethod::TTest);
    }
}
