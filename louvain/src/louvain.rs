use crate::local_moving::LocalMoving;
use crate::{Clustering, Network};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Default resolution of the modularity objective.
pub const DEFAULT_RESOLUTION: f64 = 1.0;

/// Seeded Louvain community detection.
pub struct Louvain {
    rng: ChaCha20Rng,
    local_moving: LocalMoving,
}

impl Louvain {
    /// Create a driver with the given resolution and random seed. The seed is
    /// required: clustering without one is not reproducible.
    pub fn new(resolution: f64, seed: u64) -> Louvain {
        Louvain {
            rng: ChaCha20Rng::seed_from_u64(seed),
            local_moving: LocalMoving::new(resolution),
        }
    }

    /// One full pass: local moving, then aggregation and recursion on the
    /// reduced network. Returns true if any label changed.
    pub fn iterate(&mut self, n: &Network, c: &mut Clustering) -> bool {
        let mut update = self.local_moving.iterate(n, c, &mut self.rng);

        if c.num_clusters() == n.nodes() {
            return update;
        }

        let reduced = n.aggregate(c);
        let mut reduced_clustering = Clustering::init_singletons(reduced.nodes());
        update |= self.iterate(&reduced, &mut reduced_clustering);
        c.merge(&reduced_clustering);

        update
    }

    /// Run passes until the labeling stops changing.
    pub fn cluster(&mut self, n: &Network) -> Clustering {
        let mut c = Clustering::init_singletons(n.nodes());
        while self.iterate(n, &mut c) {}
        c
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn clique_pair() -> Network {
        // two 4-cliques joined by a single weak edge
        let mut edges = Vec::new();
        for base in [0usize, 4] {
            for i in 0..4 {
                for j in (i + 1)..4 {
                    edges.push((base + i, base + j, 1.0));
                }
            }
        }
        edges.push((3, 4, 0.1));
        Network::from_edges(8, &edges)
    }

    #[test]
    fn test_two_cliques() {
        let n = clique_pair();
        let mut louvain = Louvain::new(DEFAULT_RESOLUTION, 0);
        let c = louvain.cluster(&n);
        assert_eq!(c.num_clusters(), 2);
        for i in 0..4 {
            assert_eq!(c.get(i), c.get(0));
            assert_eq!(c.get(4 + i), c.get(4));
        }
        assert_ne!(c.get(0), c.get(4));
    }

    #[test]
    fn test_seeded_determinism() {
        let n = clique_pair();
        let a = Louvain::new(1.0, 7).cluster(&n);
        let b = Louvain::new(1.0, 7).cluster(&n);
        assert_eq!(a.labels(), b.labels());
    }

    #[test]
    fn test_sizes_sum_to_node_count() {
        let n = clique_pair();
        let c = Louvain::new(1.0, 0).cluster(&n);
        assert_eq!(c.cluster_sizes().iter().sum::<usize>(), n.nodes());
    }

    #[test]
    fn test_empty_network() {
        let n = Network::from_edges(0, &[]);
        let c = Louvain::new(1.0, 0).cluster(&n);
        assert_eq!(c.num_clusters(), 0);
    }
}
