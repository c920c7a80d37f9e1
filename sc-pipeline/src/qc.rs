//! Per-cell and per-gene quality-control metrics and threshold filtering.

use anyhow::{bail, Error};
use log::info;
use sc_types::{AnnMatrix, Column};

/// Default prefix marking mitochondrial gene symbols.
pub const MITO_PREFIX: &str = "MT-";

/// Thresholds applied by [`apply_filters`].
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct QcFilters {
    /// Keep cells with at least this many detected genes.
    pub min_genes: usize,
    /// Drop cells with this many detected genes or more (doublet guard).
    pub max_genes: usize,
    /// Keep genes detected in at least this many cells.
    pub min_cells: usize,
    /// Drop cells with a mitochondrial count fraction at or above this
    /// percentage.
    pub max_pct_mt: f64,
}

impl Default for QcFilters {
    fn default() -> QcFilters {
        QcFilters {
            min_genes: 200,
            max_genes: 2500,
            min_cells: 3,
            max_pct_mt: 5.0,
        }
    }
}

/// Annotate `obs` with `n_genes`, `total_counts` and `pct_counts_mt`, and
/// `var` with `n_cells`. Mitochondrial genes are identified by symbol prefix.
pub fn compute_qc_metrics(adata: &mut AnnMatrix, mito_prefix: &str) -> Result<(), Error> {
    let mito: Vec<bool> = adata
        .gene_symbols
        .iter()
        .map(|s| s.starts_with(mito_prefix))
        .collect();
    let n_mito = mito.iter().filter(|&&m| m).count();
    info!("{} of {} genes match mitochondrial prefix '{}'", n_mito, adata.n_vars(), mito_prefix);

    let mut n_genes = vec![0i64; adata.n_obs()];
    let mut total_counts = vec![0.0; adata.n_obs()];
    let mut pct_mt = vec![0.0; adata.n_obs()];
    let mut n_cells = vec![0i64; adata.n_vars()];

    for (cell, row) in adata.matrix().outer_iterator().enumerate() {
        let mut mito_counts = 0.0;
        for (gene, &v) in row.iter() {
            if v > 0.0 {
                n_genes[cell] += 1;
                n_cells[gene] += 1;
                total_counts[cell] += v;
                if mito[gene] {
                    mito_counts += v;
                }
            }
        }
        if total_counts[cell] > 0.0 {
            pct_mt[cell] = 100.0 * mito_counts / total_counts[cell];
        }
    }

    adata.obs.insert("n_genes", Column::Int(n_genes))?;
    adata.obs.insert("total_counts", Column::Float(total_counts))?;
    adata.obs.insert("pct_counts_mt", Column::Float(pct_mt))?;
    adata.var.insert("n_cells", Column::Int(n_cells))?;
    adata.var.insert("mt", Column::Bool(mito))?;
    Ok(())
}

/// Apply QC thresholds: low-complexity cells first, then rarely-detected
/// genes, then the doublet and mitochondrial cuts. Requires the metrics from
/// [`compute_qc_metrics`] on `obs`.
pub fn apply_filters(adata: AnnMatrix, filters: &QcFilters) -> Result<AnnMatrix, Error> {
    let n_genes = match adata.obs.get("n_genes").and_then(Column::as_int) {
        Some(col) => col.to_vec(),
        None => bail!("obs column 'n_genes' missing, run compute_qc_metrics first"),
    };
    if !adata.obs.contains("pct_counts_mt") {
        bail!("obs column 'pct_counts_mt' missing, run compute_qc_metrics first");
    }

    let keep: Vec<usize> = (0..adata.n_obs())
        .filter(|&i| n_genes[i] >= filters.min_genes as i64)
        .collect();
    info!("{} of {} cells pass min_genes >= {}", keep.len(), adata.n_obs(), filters.min_genes);
    if keep.is_empty() {
        bail!("no cells with at least {} detected genes", filters.min_genes);
    }
    let adata = adata.subset_cells(&keep)?;

    // gene detection counts are recomputed on the surviving cells
    let mut n_cells = vec![0usize; adata.n_vars()];
    for row in adata.matrix().outer_iterator() {
        for (gene, &v) in row.iter() {
            if v > 0.0 {
                n_cells[gene] += 1;
            }
        }
    }
    let keep_genes: Vec<usize> = (0..adata.n_vars())
        .filter(|&g| n_cells[g] >= filters.min_cells)
        .collect();
    info!(
        "{} of {} genes pass min_cells >= {}",
        keep_genes.len(),
        adata.n_vars(),
        filters.min_cells
    );
    if keep_genes.is_empty() {
        bail!("no genes detected in at least {} cells", filters.min_cells);
    }
    let mut adata = adata.subset_genes(&keep_genes)?;
    adata
        .var
        .insert("n_cells", Column::Int(keep_genes.iter().map(|&g| n_cells[g] as i64).collect()))?;

    // the mitochondrial fraction is recomputed on the surviving genes, so
    // counts from genes dropped by min_cells no longer enter it
    let mito = match adata.var.get("mt").and_then(Column::as_bool) {
        Some(col) => col.to_vec(),
        None => bail!("var column 'mt' missing, run compute_qc_metrics first"),
    };
    let mut pct_mt = vec![0.0; adata.n_obs()];
    for (cell, row) in adata.matrix().outer_iterator().enumerate() {
        let mut total = 0.0;
        let mut mito_counts = 0.0;
        for (gene, &v) in row.iter() {
            if v > 0.0 {
                total += v;
                if mito[gene] {
                    mito_counts += v;
                }
            }
        }
        if total > 0.0 {
            pct_mt[cell] = 100.0 * mito_counts / total;
        }
    }
    adata.obs.insert("pct_counts_mt", Column::Float(pct_mt.clone()))?;

    let n_genes = match adata.obs.get("n_genes").and_then(Column::as_int) {
        Some(col) => col.to_vec(),
        None => bail!("obs column 'n_genes' missing"),
    };
    let keep: Vec<usize> = (0..adata.n_obs())
        .filter(|&i| n_genes[i] < filters.max_genes as i64 && pct_mt[i] < filters.max_pct_mt)
        .collect();
    info!(
        "{} of {} cells pass max_genes < {} and pct_counts_mt < {}",
        keep.len(),
        adata.n_obs(),
        filters.max_genes,
        filters.max_pct_mt
    );
    if keep.is_empty() {
        bail!(
            "no cells left after doublet (< {} genes) and mitochondrial (< {}%) cuts",
            filters.max_genes,
            filters.max_pct_mt
        );
    }
    adata.subset_cells(&keep)
}
