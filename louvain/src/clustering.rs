/// A labeling of nodes with integer cluster ids.
#[derive(Clone, Debug, Default)]
pub struct Clustering {
    labels: Vec<usize>,
    num_clusters: usize,
}

impl Clustering {
    /// One cluster per node.
    pub fn init_singletons(num_nodes: usize) -> Clustering {
        Clustering {
            labels: (0..num_nodes).collect(),
            num_clusters: num_nodes,
        }
    }

    /// Adopt an existing labeling, compacting away unused labels.
    pub fn from_labels(labels: &[usize]) -> Clustering {
        let num_clusters = labels.iter().max().map_or(0, |&m| m + 1);
        let mut c = Clustering {
            labels: labels.to_vec(),
            num_clusters,
        };
        c.remove_empty_clusters();
        c
    }

    /// Label of node `i`.
    pub fn get(&self, i: usize) -> usize {
        self.labels[i]
    }

    /// Assign node `i` to `cluster`, growing the cluster count if needed.
    pub fn set(&mut self, i: usize, cluster: usize) {
        self.labels[i] = cluster;
        if cluster >= self.num_clusters {
            self.num_clusters = cluster + 1;
        }
    }

    /// Number of nodes.
    pub fn nodes(&self) -> usize {
        self.labels.len()
    }

    /// Number of distinct cluster labels.
    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// All node labels.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Node count per cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.num_clusters];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }

    /// Relabel the clusters of this clustering according to a clustering of
    /// the cluster ids themselves (the aggregation step of Louvain).
    pub fn merge(&mut self, cluster_clustering: &Clustering) {
        for l in &mut self.labels {
            *l = cluster_clustering.get(*l);
        }
        self.num_clusters = cluster_clustering.num_clusters();
        self.remove_empty_clusters();
    }

    /// Compact labels to `0..n`, dropping ids with no members.
    pub fn remove_empty_clusters(&mut self) {
        let mut counts = vec![0usize; self.num_clusters];
        for &l in &self.labels {
            counts[l] += 1;
        }

        let mut remap = vec![usize::MAX; self.num_clusters];
        let mut next = 0;
        for (old, &count) in counts.iter().enumerate() {
            if count > 0 {
                remap[old] = next;
                next += 1;
            }
        }

        for l in &mut self.labels {
            *l = remap[*l];
        }
        self.num_clusters = next;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_compaction() {
        let c = Clustering::from_labels(&[1, 3, 3, 5]);
        assert_eq!(c.num_clusters(), 3);
        assert_eq!(c.labels(), &[0, 1, 1, 2]);
        assert_eq!(c.cluster_sizes(), vec![1, 2, 1]);
    }

    #[test]
    fn test_merge() {
        let mut c = Clustering::from_labels(&[0, 0, 1, 2]);
        // merge clusters 1 and 2
        let upper = Clustering::from_labels(&[0, 1, 1]);
        c.merge(&upper);
        assert_eq!(c.num_clusters(), 2);
        assert_eq!(c.labels(), &[0, 0, 1, 1]);
    }
}
