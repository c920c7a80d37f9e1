use crate::Clustering;
use fxhash::FxHashMap;

/// Weighted undirected graph stored as a CSR adjacency structure.
///
/// Each undirected edge appears in the adjacency of both endpoints. Node
/// weights default to the total weight of incident edges (node strength),
/// which is what the modularity objective expects.
pub struct Network {
    offsets: Vec<usize>,
    neighbors: Vec<u32>,
    weights: Vec<f64>,
    node_weights: Vec<f64>,
    total_edge_weight: f64,
}

impl Network {
    /// Build a network from a list of undirected edges `(i, j, w)`.
    /// Duplicate pairs have their weights summed; self-loops are ignored.
    pub fn from_edges(n_nodes: usize, edges: &[(usize, usize, f64)]) -> Network {
        let mut merged: FxHashMap<(u32, u32), f64> = FxHashMap::default();
        for &(i, j, w) in edges {
            if i == j {
                continue;
            }
            let key = if i < j { (i as u32, j as u32) } else { (j as u32, i as u32) };
            *merged.entry(key).or_insert(0.0) += w;
        }

        let mut degree = vec![0usize; n_nodes];
        for &(i, j) in merged.keys() {
            degree[i as usize] += 1;
            degree[j as usize] += 1;
        }

        let mut offsets = Vec::with_capacity(n_nodes + 1);
        let mut running = 0;
        offsets.push(0);
        for d in &degree {
            running += d;
            offsets.push(running);
        }

        let nnz = offsets[n_nodes];
        let mut neighbors = vec![0u32; nnz];
        let mut weights = vec![0.0; nnz];
        let mut cursor = offsets[..n_nodes].to_vec();
        let mut node_weights = vec![0.0; n_nodes];
        let mut total_edge_weight = 0.0;

        for (&(i, j), &w) in &merged {
            let (iu, ju) = (i as usize, j as usize);
            neighbors[cursor[iu]] = j;
            weights[cursor[iu]] = w;
            cursor[iu] += 1;
            neighbors[cursor[ju]] = i;
            weights[cursor[ju]] = w;
            cursor[ju] += 1;
            node_weights[iu] += w;
            node_weights[ju] += w;
            total_edge_weight += w;
        }

        Network {
            offsets,
            neighbors,
            weights,
            node_weights,
            total_edge_weight,
        }
    }

    /// Number of nodes.
    pub fn nodes(&self) -> usize {
        self.node_weights.len()
    }

    /// Weight of `node` (its strength).
    pub fn weight(&self, node: usize) -> f64 {
        self.node_weights[node]
    }

    /// Sum of all edge weights, each undirected edge counted once.
    pub fn total_edge_weight(&self) -> f64 {
        self.total_edge_weight
    }

    /// Iterator over `(neighbor, edge_weight)` pairs of `node`.
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.offsets[node]..self.offsets[node + 1];
        self.neighbors[range.clone()]
            .iter()
            .zip(&self.weights[range])
            .map(|(&n, &w)| (n as usize, w))
    }

    /// Aggregate the network by cluster: one node per cluster, node weights
    /// summed, inter-cluster edge weights summed, intra-cluster edges dropped.
    pub fn aggregate(&self, clustering: &Clustering) -> Network {
        let n_clusters = clustering.num_clusters();

        let mut edge_memo: FxHashMap<(u32, u32), f64> = FxHashMap::default();
        for i in 0..self.nodes() {
            let ci = clustering.get(i);
            for (j, w) in self.neighbors(i) {
                // visit each undirected edge once
                if j <= i {
                    continue;
                }
                let cj = clustering.get(j);
                if ci == cj {
                    continue;
                }
                let key = if ci < cj { (ci as u32, cj as u32) } else { (cj as u32, ci as u32) };
                *edge_memo.entry(key).or_insert(0.0) += w;
            }
        }

        let edges: Vec<(usize, usize, f64)> = edge_memo
            .into_iter()
            .map(|((a, b), w)| (a as usize, b as usize, w))
            .collect();
        let mut reduced = Network::from_edges(n_clusters, &edges);

        // node weights carry over from the member nodes, not just the
        // surviving inter-cluster edges
        let mut node_weights = vec![0.0; n_clusters];
        for i in 0..self.nodes() {
            node_weights[clustering.get(i)] += self.weight(i);
        }
        reduced.node_weights = node_weights;
        reduced
    }
}
