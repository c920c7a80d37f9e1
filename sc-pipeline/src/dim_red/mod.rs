//! Scaling and principal component analysis of the expression matrix.

pub mod eig;

pub use eig::EigPca;

use anyhow::{ensure, Error};
use log::info;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use sc_types::AnnMatrix;

/// Result of a PCA run.
pub struct PcaResult {
    /// Cells x k projection of the input.
    pub transformed: Array2<f64>,
    /// k x genes principal axes, rows orthonormal.
    pub components: Array2<f64>,
    /// Fraction of total variance captured by each component.
    pub explained_variance_ratio: Array1<f64>,
}

/// A principal component analysis method.
pub trait Pca {
    /// Compute the top `k` components of centered data `x`.
    fn run_pca(&self, x: ArrayView2<f64>, k: usize) -> Result<PcaResult, Error>;
}

/// Densify the matrix and standardize each gene to zero mean and unit
/// variance, clipping standardized values above `max_value`. Genes with zero
/// variance come out as all zeros.
pub fn scale_and_clip(adata: &AnnMatrix, max_value: f64) -> Array2<f64> {
    let (n_cells, n_genes) = (adata.n_obs(), adata.n_vars());
    let mut dense = Array2::zeros((n_cells, n_genes));
    for (cell, row) in adata.matrix().outer_iterator().enumerate() {
        for (gene, &v) in row.iter() {
            dense[[cell, gene]] = v;
        }
    }

    for mut col in dense.axis_iter_mut(Axis(1)) {
        let mean = col.sum() / n_cells as f64;
        let var = if n_cells > 1 {
            col.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>() / (n_cells - 1) as f64
        } else {
            0.0
        };
        let std = var.sqrt();
        if std > 0.0 {
            col.mapv_inplace(|x| (((x - mean) / std)).min(max_value));
        } else {
            col.fill(0.0);
        }
    }
    dense
}

/// Scale the matrix, run PCA and store the `X_pca` embedding together with
/// the per-component variance ratios under `uns["pca_variance_ratio"]`.
pub fn pca(adata: &mut AnnMatrix, n_comps: usize, max_value: f64) -> Result<(), Error> {
    ensure!(n_comps > 0, "n_comps must be at least 1");
    ensure!(
        n_comps <= adata.n_obs().min(adata.n_vars()),
        "n_comps = {} exceeds the matrix rank bound min({}, {})",
        n_comps,
        adata.n_obs(),
        adata.n_vars()
    );

    let scaled = scale_and_clip(adata, max_value);
    info!("running PCA with {} components on {} cells", n_comps, adata.n_obs());
    let result = EigPca::default().run_pca(scaled.view(), n_comps)?;

    adata.add_embedding("X_pca", result.transformed)?;
    adata
        .uns
        .insert("pca_variance_ratio".to_string(), result.explained_variance_ratio.to_vec());
    Ok(())
}
