//! Depth normalization and log transformation of the count matrix.

use anyhow::{bail, Error};
use log::info;
use ndarray::Array1;
use noisy_float::prelude::n64;
use sc_types::AnnMatrix;
use sprs::CsMat;

use crate::stats::median_mut;

/// Rebuild a CSR matrix with every stored value passed through `f(row, value)`.
pub(crate) fn map_csr(mat: &CsMat<f64>, mut f: impl FnMut(usize, f64) -> f64) -> CsMat<f64> {
    let mut indptr = Vec::with_capacity(mat.rows() + 1);
    let mut indices = Vec::with_capacity(mat.nnz());
    let mut data = Vec::with_capacity(mat.nnz());
    indptr.push(0);
    for (row, vec) in mat.outer_iterator().enumerate() {
        for (col, &v) in vec.iter() {
            indices.push(col);
            data.push(f(row, v));
        }
        indptr.push(indices.len());
    }
    CsMat::new((mat.rows(), mat.cols()), indptr, indices, data)
}

/// Scale each cell so its counts sum to `target_sum`. With `None` the median
/// of the per-cell totals is used. Cells with zero counts are left untouched.
pub fn normalize_total(adata: &mut AnnMatrix, target_sum: Option<f64>) -> Result<(), Error> {
    let totals: Vec<f64> = adata
        .matrix()
        .outer_iterator()
        .map(|row| row.iter().map(|(_, &v)| v).sum())
        .collect();

    let target = match target_sum {
        Some(t) => {
            if t <= 0.0 {
                bail!("target_sum must be positive, got {}", t);
            }
            t
        }
        None => {
            let mut nonzero = Array1::from_iter(totals.iter().filter(|&&t| t > 0.0).map(|&t| n64(t)));
            match median_mut(&mut nonzero) {
                Ok(median) => median.raw(),
                Err(_) => bail!("cannot normalize an all-zero matrix"),
            }
        }
    };
    info!("scaling {} cells to a target sum of {}", adata.n_obs(), target);

    let scales: Vec<f64> = totals
        .iter()
        .map(|&t| if t > 0.0 { target / t } else { 1.0 })
        .collect();
    let scaled = map_csr(adata.matrix(), |row, v| v * scales[row]);
    adata.set_matrix(scaled)
}

/// Replace every stored value `x` with `ln(1 + x)`.
pub fn log1p(adata: &mut AnnMatrix) -> Result<(), Error> {
    let logged = map_csr(adata.matrix(), |_, v| v.ln_1p());
    adata.set_matrix(logged)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sc_types::MetaTable;
    use sprs::TriMat;

    fn counts(dense: &[[f64; 3]]) -> AnnMatrix {
        let mut tri = TriMat::new((dense.len(), 3));
        for (i, row) in dense.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    tri.add_triplet(i, j, v);
                }
            }
        }
        let obs = MetaTable::new((0..dense.len()).map(|i| format!("c{i}")).collect());
        let var = MetaTable::new((0..3).map(|j| format!("g{j}")).collect());
        let symbols = (0..3).map(|j| format!("G{j}")).collect();
        AnnMatrix::new(tri.to_csr(), obs, var, symbols).unwrap()
    }

    fn row_sum(adata: &AnnMatrix, i: usize) -> f64 {
        adata
            .matrix()
            .outer_view(i)
            .map(|row| row.iter().map(|(_, &v)| v).sum())
            .unwrap_or(0.0)
    }

    #[test]
    fn test_normalize_to_fixed_target() {
        let mut adata = counts(&[[2.0, 2.0, 0.0], [1.0, 0.0, 9.0], [0.0, 0.0, 0.0]]);
        normalize_total(&mut adata, Some(100.0)).unwrap();
        assert_abs_diff_eq!(row_sum(&adata, 0), 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row_sum(&adata, 1), 100.0, epsilon = 1e-9);
        // the empty cell stays empty
        assert_eq!(row_sum(&adata, 2), 0.0);
    }

    #[test]
    fn test_normalize_to_median() {
        let mut adata = counts(&[[4.0, 0.0, 0.0], [0.0, 8.0, 0.0], [0.0, 0.0, 16.0]]);
        normalize_total(&mut adata, None).unwrap();
        for i in 0..3 {
            assert_abs_diff_eq!(row_sum(&adata, i), 8.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_bad_target() {
        let mut adata = counts(&[[1.0, 0.0, 0.0]]);
        assert!(normalize_total(&mut adata, Some(0.0)).is_err());
    }

    #[test]
    fn test_log1p() {
        let mut adata = counts(&[[1.0, 3.0, 0.0]]);
        log1p(&mut adata).unwrap();
        assert_abs_diff_eq!(adata.matrix().get(0, 0).copied().unwrap(), 2.0f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(adata.matrix().get(0, 1).copied().unwrap(), 4.0f64.ln(), epsilon = 1e-12);
        assert_eq!(adata.matrix().get(0, 2), None);
    }
}
