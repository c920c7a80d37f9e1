//! Fuzzy simplicial set construction from a k-nearest-neighbor graph.
//!
//! Distances to each point's neighbors are normalized by a local bandwidth
//! (found by binary search so that the effective neighbor count matches
//! `log2(k)`), converted to membership strengths, and combined into a single
//! symmetric graph via a fuzzy set union.

use ndarray::{Array2, ArrayView1};
use sprs::{CsMat, TriMat};

const BANDWIDTH: f64 = 1.0;
const NITER: usize = 64;
const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const MIN_K_DIST_SCALE: f64 = 1e-3;

/// Build the fuzzy graph over `n` points from their kNN `(indices, distances)`
/// arrays (both n x k). `set_op_mix_ratio` interpolates between fuzzy union
/// (1.0) and fuzzy intersection (0.0).
pub fn fuzzy_simplicial_set(
    knn_indices: &Array2<usize>,
    knn_distances: &Array2<f64>,
    local_connectivity: f64,
    set_op_mix_ratio: f64,
) -> CsMat<f64> {
    let (n_points, _) = knn_indices.dim();

    let (sigmas, rhos) = smooth_knn_distances(knn_distances, local_connectivity, NITER, BANDWIDTH);
    let (rows, cols, values) = membership_strengths(knn_indices, knn_distances, &sigmas, &rhos);

    let result = TriMat::from_triplets((n_points, n_points), rows, cols, values).to_csr();
    let transpose = result.transpose_view().to_csr();

    let prod = sprs::binop::mul_mat_same_storage(&result, &transpose);
    let sum = &result + &transpose;
    let union = &(&sum - &prod) * set_op_mix_ratio;
    let intersection = &prod * (1.0 - set_op_mix_ratio);
    let combined = &union + &intersection;

    log::debug!("fuzzy graph over {} points has {} edges", n_points, combined.nnz());
    combined
}

/// Per-point connectivity distance `rho` (distance to the nearest neighbor,
/// interpolated for fractional `local_connectivity`) and smoothed bandwidth
/// `sigma`.
fn smooth_knn_distances(
    knn_distances: &Array2<f64>,
    local_connectivity: f64,
    n_iter: usize,
    bandwidth: f64,
) -> (Vec<f64>, Vec<f64>) {
    let (n_points, k) = knn_distances.dim();
    let mut rhos = vec![0.0; n_points];
    let mut sigmas = vec![0.0; n_points];

    let mean_all = knn_distances.mean().unwrap_or(0.0);

    for i in 0..n_points {
        let row = knn_distances.row(i);
        let non_zero: Vec<f64> = row.iter().cloned().filter(|&d| d > 0.0).collect();

        if non_zero.len() >= local_connectivity as usize && !non_zero.is_empty() {
            let index = local_connectivity.floor();
            let interpolation = local_connectivity - index;
            if index >= 1.0 {
                let index = index as usize;
                rhos[i] = non_zero[index - 1];
                if interpolation > SMOOTH_K_TOLERANCE && index < non_zero.len() {
                    rhos[i] += interpolation * (non_zero[index] - non_zero[index - 1]);
                }
            } else {
                rhos[i] = interpolation * non_zero[0];
            }
        } else if !non_zero.is_empty() {
            rhos[i] = non_zero.iter().fold(f64::MIN, |a, &b| a.max(b));
        }

        sigmas[i] = smooth_knn_dist(row, rhos[i], k, bandwidth, n_iter);

        // keep sigma from collapsing to zero
        let floor = if rhos[i] > 0.0 {
            MIN_K_DIST_SCALE * row.mean().unwrap_or(0.0)
        } else {
            MIN_K_DIST_SCALE * mean_all
        };
        if sigmas[i] < floor {
            sigmas[i] = floor;
        }
    }

    (sigmas, rhos)
}

/// Binary search for the bandwidth that makes the exponential membership sum
/// hit the `log2(k)` target.
fn smooth_knn_dist(distances: ArrayView1<f64>, rho: f64, k: usize, bandwidth: f64, n_iter: usize) -> f64 {
    let target = (k as f64).log2() * bandwidth;
    let mut lo = 0.0;
    let mut mid = 1.0;
    let mut hi = f64::MAX;

    for _ in 0..n_iter {
        let psum = distances
            .iter()
            .fold(0.0, |acc, &d| acc + (-((d - rho).max(0.0) / mid)).exp());

        if (psum - target).abs() < SMOOTH_K_TOLERANCE {
            break;
        }
        if psum > target {
            hi = mid;
            mid = lo + (hi - lo) / 2.0;
        } else {
            lo = mid;
            if hi == f64::MAX {
                mid *= 2.0;
            } else {
                mid = lo + (hi - lo) / 2.0;
            }
        }
    }
    mid
}

fn membership_strengths(
    knn_indices: &Array2<usize>,
    knn_distances: &Array2<f64>,
    sigmas: &[f64],
    rhos: &[f64],
) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    let (n_points, k) = knn_indices.dim();
    let mut rows = Vec::with_capacity(n_points * k);
    let mut cols = Vec::with_capacity(n_points * k);
    let mut values = Vec::with_capacity(n_points * k);

    for i in 0..n_points {
        for j in 0..k {
            let neighbor = knn_indices[[i, j]];
            if neighbor == usize::MAX || neighbor == i {
                continue;
            }
            let d = knn_distances[[i, j]];
            let val = if d - rhos[i] <= 0.0 || sigmas[i] == 0.0 {
                1.0
            } else {
                (-((d - rhos[i]) / sigmas[i])).exp()
            };
            rows.push(i);
            cols.push(neighbor);
            values.push(val);
        }
    }

    (rows, cols, values)
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_rho_is_nearest_nonzero_distance() {
        let dists = arr2(&[
            [1.0, 2.0, 3.0],
            [2.0, 4.0, 5.0],
            [3.0, 4.0, 5.0],
            [5.0, 6.0, 10.0],
        ]);
        let (_, rhos) = smooth_knn_distances(&dists, 1.0, 64, 1.0);
        assert_eq!(rhos, vec![1.0, 2.0, 3.0, 5.0]);
    }

    #[test]
    fn test_rho_interpolation() {
        let dists = arr2(&[[1.0, 2.0, 3.0]]);
        let (_, rhos) = smooth_knn_distances(&dists, 1.5, 64, 1.0);
        assert_eq!(rhos, vec![1.5]);
    }

    #[test]
    fn test_smooth_knn_dist_hits_target() {
        let dists = ndarray::arr1(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let sigma = smooth_knn_dist(dists.view(), 1.0, 6, 1.0, 64);
        let psum: f64 = dists.iter().map(|&d| (-((d - 1.0).max(0.0) / sigma)).exp()).sum();
        assert!((psum - 6.0f64.log2()).abs() <= SMOOTH_K_TOLERANCE);
    }

    #[test]
    fn test_fuzzy_graph_is_symmetric() {
        let knns = arr2(&[[1, 2], [0, 2], [1, 0]]);
        let dists = arr2(&[[1.5, 0.5], [0.5, 2.0], [1.5, 2.0]]);
        let graph = fuzzy_simplicial_set(&knns, &dists, 1.0, 1.0);
        assert_eq!(graph.shape(), (3, 3));
        for (&v, (i, j)) in graph.iter() {
            let w = graph.get(j, i).copied().unwrap_or(0.0);
            assert!((v - w).abs() < 1e-12);
        }
    }
}
