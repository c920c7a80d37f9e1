//! Nearest-neighbor graph construction over the PCA embedding.

use anyhow::{bail, ensure, Error};
use log::info;
use ndarray::{s, Array2, ArrayView2};
use noisy_float::prelude::n64;
use rayon::prelude::*;
use sc_types::AnnMatrix;
use sprs::TriMat;
use umap_embed::fuzzy_simplicial_set;

/// Compute the `k` nearest neighbors of each row in `v` under Euclidean
/// distance, excluding the point itself. Returns `(indices, distances)`,
/// both `n x k` with neighbors in increasing distance order.
pub fn knn(v: &ArrayView2<f64>, k: usize) -> Result<(Array2<usize>, Array2<f64>), Error> {
    let (cells, _) = v.dim();
    ensure!(k >= 1, "neighbor count must be at least 1");
    ensure!(
        k < cells,
        "cannot find {} neighbors among {} cells",
        k,
        cells
    );

    info!("querying {} cells for {} neighbors", cells, k);
    let rows: Vec<(Vec<usize>, Vec<f64>)> = (0..cells)
        .into_par_iter()
        .map(|cell| {
            let me = v.row(cell);
            let mut nns: Vec<(noisy_float::types::N64, usize)> = (0..cells)
                .filter(|&other| other != cell)
                .map(|other| {
                    let d: f64 = me
                        .iter()
                        .zip(v.row(other).iter())
                        .map(|(&a, &b)| (a - b) * (a - b))
                        .sum();
                    (n64(d.sqrt()), other)
                })
                .collect();
            nns.sort_unstable();
            nns.truncate(k);
            (
                nns.iter().map(|&(_, i)| i).collect(),
                nns.iter().map(|&(d, _)| d.raw()).collect(),
            )
        })
        .collect();

    let mut indices = Array2::zeros((cells, k));
    let mut distances = Array2::zeros((cells, k));
    for (cell, (idx, dist)) in rows.into_iter().enumerate() {
        for j in 0..k {
            indices[[cell, j]] = idx[j];
            distances[[cell, j]] = dist[j];
        }
    }
    Ok((indices, distances))
}

/// Build the neighbor graphs from the first `n_pcs` columns of the `X_pca`
/// embedding: a sparse `distances` graph of raw kNN distances, and the
/// symmetric fuzzy `connectivities` graph used for clustering and UMAP.
pub fn neighbors(adata: &mut AnnMatrix, n_neighbors: usize, n_pcs: usize) -> Result<(), Error> {
    let pca = match adata.embedding("X_pca") {
        Some(e) => e,
        None => bail!("embedding 'X_pca' missing, run pca first"),
    };
    ensure!(
        n_pcs <= pca.ncols(),
        "n_pcs = {} but the PCA embedding has only {} components",
        n_pcs,
        pca.ncols()
    );
    let view = pca.slice(s![.., ..n_pcs]);

    let (indices, distances) = knn(&view, n_neighbors)?;

    let cells = adata.n_obs();
    let mut tri = TriMat::with_capacity((cells, cells), cells * n_neighbors);
    for cell in 0..cells {
        for j in 0..n_neighbors {
            tri.add_triplet(cell, indices[[cell, j]], distances[[cell, j]]);
        }
    }

    let connectivities = fuzzy_simplicial_set(&indices, &distances, 1.0, 1.0);

    adata.add_graph("distances", tri.to_csr())?;
    adata.add_graph("connectivities", connectivities)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_distr::Normal;
    use rand_pcg::Pcg64Mcg;

    // Reference n^2 implementation without the parallel machinery
    fn exhaustive_knn(v: &ArrayView2<f64>, k: usize) -> Array2<usize> {
        let cells = v.shape()[0];
        let mut output = Array2::zeros((cells, k));
        for cell in 0..cells {
            let mut nns: Vec<(noisy_float::types::N64, usize)> = (0..cells)
                .filter(|&o| o != cell)
                .map(|o| {
                    let d: f64 = v
                        .row(cell)
                        .iter()
                        .zip(v.row(o).iter())
                        .map(|(&a, &b)| (a - b) * (a - b))
                        .sum();
                    (n64(d.sqrt()), o)
                })
                .collect();
            nns.sort_unstable();
            for i in 0..k {
                output[(cell, i)] = nns[i].1;
            }
        }
        output
    }

    #[test]
    fn test_knn_matches_reference() {
        let mut rng = Pcg64Mcg::seed_from_u64(0);
        for &cells in &[5, 20, 60] {
            for &d in &[2, 5] {
                let dist = Normal::new(0.0f64, 1.0f64).unwrap();
                let v = Array2::<f64>::random_using((cells, d), dist, &mut rng);
                for &k in &[1, 3] {
                    let (indices, distances) = knn(&v.view(), k).unwrap();
                    assert_eq!(indices, exhaustive_knn(&v.view(), k));
                    // distances are non-decreasing within a row
                    for row in distances.rows() {
                        for w in row.as_slice().unwrap().windows(2) {
                            assert!(w[0] <= w[1]);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_knn_rejects_k_too_large() {
        let v = arr2(&[[0.0, 0.0], [1.0, 0.0]]);
        assert!(knn(&v.view(), 2).is_err());
        assert!(knn(&v.view(), 1).is_ok());
    }

    #[test]
    fn test_neighbors_requires_pca() {
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(1, 1, 1.0);
        let mut adata = AnnMatrix::new(
            tri.to_csr(),
            sc_types::MetaTable::new(vec!["a".into(), "b".into()]),
            sc_types::MetaTable::new(vec!["g0".into(), "g1".into()]),
            vec!["G0".into(), "G1".into()],
        )
        .unwrap();
        assert!(neighbors(&mut adata, 1, 1).is_err());
    }

    #[test]
    fn test_neighbors_stores_graphs() {
        let mut tri = TriMat::new((4, 2));
        for i in 0..4 {
            tri.add_triplet(i, 0, (i + 1) as f64);
        }
        let mut adata = AnnMatrix::new(
            tri.to_csr(),
            sc_types::MetaTable::new((0..4).map(|i| format!("c{i}")).collect()),
            sc_types::MetaTable::new(vec!["g0".into(), "g1".into()]),
            vec!["G0".into(), "G1".into()],
        )
        .unwrap();
        let coords = arr2(&[[0.0, 0.0], [0.0, 1.0], [5.0, 5.0], [5.0, 6.0]]);
        adata.add_embedding("X_pca", coords).unwrap();

        neighbors(&mut adata, 2, 2).unwrap();
        let distances = adata.graph("distances").unwrap();
        assert_eq!(distances.shape(), (4, 4));
        assert_eq!(distances.nnz(), 8);
        // nearest neighbor of cell 0 is cell 1
        assert_eq!(distances.get(0, 1), Some(&1.0));

        let conn = adata.graph("connectivities").unwrap();
        assert_eq!(conn.shape(), (4, 4));
        for (&v, (i, j)) in conn.iter() {
            let w = conn.get(j, i).copied().unwrap_or(0.0);
            assert!((v - w).abs() < 1e-12);
        }
    }
}
