//! Stochastic gradient descent over the fuzzy graph: sampled attractive moves
//! along edges and repulsive moves against random negative samples.

use ndarray::Array2;
use rand::Rng;
use sprs::CsMat;

const GRADIENT_CLIP: f64 = 4.0;

pub(crate) struct OptimizeParams {
    pub a: f64,
    pub b: f64,
    pub repulsion_strength: f64,
    pub initial_alpha: f64,
    pub negative_sample_rate: usize,
    pub n_epochs: usize,
}

/// Edge list of the pruned graph plus the per-edge sampling cadence. Edges
/// whose weight would be sampled less than once over the full run are dropped.
pub(crate) fn make_epochs_per_sample(graph: &CsMat<f64>, n_epochs: usize) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    let max_weight = graph.data().iter().fold(0.0f64, |m, &w| m.max(w));
    let threshold = max_weight / n_epochs as f64;

    let mut head = Vec::new();
    let mut tail = Vec::new();
    let mut epochs_per_sample = Vec::new();
    for (&w, (i, j)) in graph.iter() {
        if w >= threshold && w > 0.0 {
            head.push(i);
            tail.push(j);
            epochs_per_sample.push(max_weight / w);
        }
    }
    (head, tail, epochs_per_sample)
}

fn clip(v: f64) -> f64 {
    v.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

/// Run the layout optimization in place. Both endpoints of an edge move on an
/// attractive update; only the head moves on a repulsive one.
pub(crate) fn optimize_layout(
    embedding: &mut Array2<f64>,
    head: &[usize],
    tail: &[usize],
    epochs_per_sample: &[f64],
    params: &OptimizeParams,
    rng: &mut impl Rng,
) {
    let (n_points, dim) = embedding.dim();
    if n_points == 0 || head.is_empty() {
        return;
    }

    let OptimizeParams {
        a,
        b,
        repulsion_strength,
        initial_alpha,
        negative_sample_rate,
        n_epochs,
    } = *params;

    let epochs_per_negative_sample: Vec<f64> = epochs_per_sample
        .iter()
        .map(|&e| e / negative_sample_rate as f64)
        .collect();
    let mut epoch_of_next_sample = epochs_per_sample.to_vec();
    let mut epoch_of_next_negative_sample = epochs_per_negative_sample.clone();

    for epoch in 0..n_epochs {
        let alpha = initial_alpha * (1.0 - epoch as f64 / n_epochs as f64);

        for i in 0..head.len() {
            if epoch_of_next_sample[i] > epoch as f64 {
                continue;
            }

            let (j, k) = (head[i], tail[i]);

            let mut dist_squared = 0.0;
            for d in 0..dim {
                let diff = embedding[[j, d]] - embedding[[k, d]];
                dist_squared += diff * diff;
            }

            if dist_squared > 0.0 {
                let grad_coeff =
                    (-2.0 * a * b * dist_squared.powf(b - 1.0)) / (a * dist_squared.powf(b) + 1.0);
                for d in 0..dim {
                    let grad = clip(grad_coeff * (embedding[[j, d]] - embedding[[k, d]]));
                    embedding[[j, d]] += grad * alpha;
                    embedding[[k, d]] -= grad * alpha;
                }
            }

            epoch_of_next_sample[i] += epochs_per_sample[i];

            let n_neg_samples = ((epoch as f64 - epoch_of_next_negative_sample[i])
                / epochs_per_negative_sample[i]) as usize;

            for _ in 0..n_neg_samples {
                let k = rng.gen_range(0..n_points);
                if j == k {
                    continue;
                }

                let mut dist_squared = 0.0;
                for d in 0..dim {
                    let diff = embedding[[j, d]] - embedding[[k, d]];
                    dist_squared += diff * diff;
                }

                let grad_coeff = if dist_squared > 0.0 {
                    (2.0 * repulsion_strength * b)
                        / ((0.001 + dist_squared) * (a * dist_squared.powf(b) + 1.0))
                } else {
                    0.0
                };

                for d in 0..dim {
                    let grad = if grad_coeff > 0.0 {
                        clip(grad_coeff * (embedding[[j, d]] - embedding[[k, d]]))
                    } else {
                        GRADIENT_CLIP
                    };
                    embedding[[j, d]] += grad * alpha;
                }
            }

            epoch_of_next_negative_sample[i] +=
                n_neg_samples as f64 * epochs_per_negative_sample[i];
        }

        if epoch % 100 == 0 {
            log::debug!("layout optimization epoch {}/{}", epoch, n_epochs);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;
    use sprs::TriMat;

    fn pair_graph() -> CsMat<f64> {
        let mut tri = TriMat::new((4, 4));
        tri.add_triplet(0, 1, 1.0);
        tri.add_triplet(1, 0, 1.0);
        tri.add_triplet(2, 3, 1.0);
        tri.add_triplet(3, 2, 1.0);
        tri.to_csr()
    }

    #[test]
    fn test_epochs_per_sample_prunes_weak_edges() {
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 1, 1.0);
        tri.add_triplet(1, 0, 1e-6);
        let graph = tri.to_csr();
        let (head, _, eps) = make_epochs_per_sample(&graph, 100);
        assert_eq!(head, vec![0]);
        assert_eq!(eps, vec![1.0]);
    }

    #[test]
    fn test_connected_pairs_end_up_close() {
        let graph = pair_graph();
        let (head, tail, eps) = make_epochs_per_sample(&graph, 500);
        let mut rng = Pcg64Mcg::seed_from_u64(42);
        let mut embedding =
            Array2::from_shape_fn((4, 2), |_| rng.gen_range(-10.0..10.0));

        let params = OptimizeParams {
            a: 1.577,
            b: 0.895,
            repulsion_strength: 1.0,
            initial_alpha: 1.0,
            negative_sample_rate: 5,
            n_epochs: 500,
        };
        optimize_layout(&mut embedding, &head, &tail, &eps, &params, &mut rng);

        let dist = |i: usize, j: usize| {
            let dx = embedding[[i, 0]] - embedding[[j, 0]];
            let dy = embedding[[i, 1]] - embedding[[j, 1]];
            (dx * dx + dy * dy).sqrt()
        };
        assert!(embedding.iter().all(|v| v.is_finite()));
        assert!(dist(0, 1) < dist(0, 2));
        assert!(dist(2, 3) < dist(1, 3));
    }
}
