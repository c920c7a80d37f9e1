//! Low-dimensional embedding of a k-nearest-neighbor graph with UMAP.
//!
//! The pipeline is the classic one: turn kNN distances into a fuzzy
//! simplicial set, fit the attraction curve parameters from `spread` and
//! `min_dist`, initialize point positions from a seeded uniform distribution,
//! and refine them with negative-sampling stochastic gradient descent.

#![deny(missing_docs)]

pub mod curve;
pub mod fuzzy;
mod optimize;

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use sprs::CsMat;

pub use crate::curve::find_ab_params;
pub use crate::fuzzy::fuzzy_simplicial_set;

const INITIAL_EMBEDDING_RANGE: f64 = 10.0;

/// Embedding hyperparameters. The defaults mirror the reference
/// implementation's.
#[derive(Clone, Debug)]
pub struct Umap {
    /// Output dimensionality.
    pub n_components: usize,
    /// Minimum spacing between embedded points.
    pub min_dist: f64,
    /// Scale of the embedded cloud.
    pub spread: f64,
    /// Initial SGD learning rate, decayed linearly to zero.
    pub learning_rate: f64,
    /// Negative samples drawn per positive edge sample.
    pub negative_sample_rate: usize,
    /// Weight of the repulsive gradient.
    pub repulsion_strength: f64,
    /// Blend between fuzzy union (1.0) and intersection (0.0).
    pub set_op_mix_ratio: f64,
    /// Assumed number of fully-connected nearest neighbors.
    pub local_connectivity: f64,
    /// Optimization epochs; picked from the data size when `None`.
    pub n_epochs: Option<usize>,
}

impl Default for Umap {
    fn default() -> Umap {
        Umap {
            n_components: 2,
            min_dist: 0.1,
            spread: 1.0,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            repulsion_strength: 1.0,
            set_op_mix_ratio: 1.0,
            local_connectivity: 1.0,
            n_epochs: None,
        }
    }
}

impl Umap {
    /// Embed `n` points given their kNN `(indices, distances)` arrays, both
    /// `n x k`. Deterministic for a fixed seed.
    pub fn embed(
        &self,
        knn_indices: &Array2<usize>,
        knn_distances: &Array2<f64>,
        seed: u64,
    ) -> Array2<f64> {
        let graph = fuzzy_simplicial_set(
            knn_indices,
            knn_distances,
            self.local_connectivity,
            self.set_op_mix_ratio,
        );
        self.embed_graph(&graph, seed)
    }

    /// Embed from an already-built fuzzy graph.
    pub fn embed_graph(&self, graph: &CsMat<f64>, seed: u64) -> Array2<f64> {
        let n_points = graph.rows();
        let n_epochs = self.n_epochs.unwrap_or(if n_points <= 10_000 { 500 } else { 200 });
        let (a, b) = find_ab_params(self.spread, self.min_dist);
        log::info!(
            "embedding {} points into {} dims: a={:.4} b={:.4} epochs={}",
            n_points,
            self.n_components,
            a,
            b,
            n_epochs
        );

        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let mut embedding = Array2::from_shape_fn((n_points, self.n_components), |_| {
            rng.gen_range(-INITIAL_EMBEDDING_RANGE..INITIAL_EMBEDDING_RANGE)
        });

        let (head, tail, epochs_per_sample) = optimize::make_epochs_per_sample(graph, n_epochs);
        let params = optimize::OptimizeParams {
            a,
            b,
            repulsion_strength: self.repulsion_strength,
            initial_alpha: self.learning_rate,
            negative_sample_rate: self.negative_sample_rate,
            n_epochs,
        };
        optimize::optimize_layout(
            &mut embedding,
            &head,
            &tail,
            &epochs_per_sample,
            &params,
            &mut rng,
        );
        embedding
    }
}
