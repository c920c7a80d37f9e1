//! PCA via dense eigendecomposition of the gene-gene covariance matrix.

use anyhow::{ensure, format_err, Error};
use faer::{Mat, Side};
use ndarray::{Array1, Array2, ArrayView2};

use crate::dim_red::{Pca, PcaResult};

/// Exact PCA from the spectral decomposition of `X^T X / (n - 1)`. Suited to
/// the post-selection regime where the gene count is modest.
#[derive(Clone, Copy, Debug, Default)]
pub struct EigPca;

impl Pca for EigPca {
    fn run_pca(&self, x: ArrayView2<f64>, k: usize) -> Result<PcaResult, Error> {
        let (n_cells, n_genes) = x.dim();
        ensure!(k > 0, "component count must be at least 1");
        ensure!(
            k <= n_cells.min(n_genes),
            "requested {} components from a {} x {} matrix",
            k,
            n_cells,
            n_genes
        );
        ensure!(n_cells > 1, "PCA needs at least two observations");

        let cov = x.t().dot(&x) / (n_cells - 1) as f64;
        let cov_faer = Mat::from_fn(n_genes, n_genes, |i, j| cov[[i, j]]);
        let eig = cov_faer
            .self_adjoint_eigen(Side::Lower)
            .map_err(|err| format_err!("eigendecomposition failed: {err:?}"))?;
        let values = eig.S();
        let vectors = eig.U();

        // eigenpairs come back in no particular order
        let mut order: Vec<usize> = (0..n_genes).collect();
        order.sort_by(|&i, &j| values[j].partial_cmp(&values[i]).unwrap_or(std::cmp::Ordering::Equal));

        let total: f64 = (0..n_genes).map(|i| values[i].max(0.0)).sum();
        let explained_variance_ratio = Array1::from_iter(
            order[..k]
                .iter()
                .map(|&i| if total > 0.0 { values[i].max(0.0) / total } else { 0.0 }),
        );

        let components = Array2::from_shape_fn((k, n_genes), |(c, g)| vectors[(g, order[c])]);
        let transformed = x.dot(&components.t());

        Ok(PcaResult {
            transformed,
            components,
            explained_variance_ratio,
        })
    }
}
