//! Graph clustering of cells over the fuzzy connectivity graph.

use anyhow::{bail, Error};
use log::info;
use louvain::{Louvain, Network};
use sc_types::{AnnMatrix, Column};

/// Run Louvain community detection on the `connectivities` graph and store
/// the labels as the obs column `louvain`. Labels are assigned by decreasing
/// cluster size, so cluster 0 is always the largest.
pub fn louvain_cluster(adata: &mut AnnMatrix, resolution: f64, seed: u64) -> Result<(), Error> {
    let graph = match adata.graph("connectivities") {
        Some(g) => g,
        None => bail!("graph 'connectivities' missing, run neighbors first"),
    };

    // upper triangle of the symmetric connectivity matrix
    let edges: Vec<(usize, usize, f64)> = graph
        .iter()
        .filter(|&(_, (i, j))| i < j)
        .map(|(&w, (i, j))| (i, j, w))
        .collect();
    let network = Network::from_edges(adata.n_obs(), &edges);

    let clustering = Louvain::new(resolution, seed).cluster(&network);
    let labels = relabel_by_size(clustering.labels(), clustering.num_clusters());

    let sizes = {
        let mut sizes = vec![0usize; labels.iter().map(|&l| l + 1).max().unwrap_or(0)];
        for &l in &labels {
            sizes[l] += 1;
        }
        sizes
    };
    info!(
        "louvain at resolution {} found {} clusters with sizes {:?}",
        resolution,
        sizes.len(),
        sizes
    );

    adata
        .obs
        .insert("louvain", Column::Int(labels.into_iter().map(|l| l as i64).collect()))
}

/// Remap labels so clusters are numbered by decreasing size, breaking ties by
/// the original label.
fn relabel_by_size(labels: &[usize], num_clusters: usize) -> Vec<usize> {
    let mut sizes = vec![0usize; num_clusters];
    for &l in labels {
        sizes[l] += 1;
    }
    let mut order: Vec<usize> = (0..num_clusters).collect();
    order.sort_by_key(|&c| (std::cmp::Reverse(sizes[c]), c));

    let mut remap = vec![0usize; num_clusters];
    for (new, &old) in order.iter().enumerate() {
        remap[old] = new;
    }
    labels.iter().map(|&l| remap[l]).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use sc_types::MetaTable;
    use sprs::TriMat;

    fn adata_with_graph(n: usize, edges: &[(usize, usize, f64)]) -> AnnMatrix {
        let mut counts = TriMat::new((n, 1));
        for i in 0..n {
            counts.add_triplet(i, 0, 1.0);
        }
        let mut adata = AnnMatrix::new(
            counts.to_csr(),
            MetaTable::new((0..n).map(|i| format!("c{i}")).collect()),
            MetaTable::new(vec!["g0".into()]),
            vec!["G0".into()],
        )
        .unwrap();

        let mut graph = TriMat::new((n, n));
        for &(i, j, w) in edges {
            graph.add_triplet(i, j, w);
            graph.add_triplet(j, i, w);
        }
        adata.add_graph("connectivities", graph.to_csr()).unwrap();
        adata
    }

    #[test]
    fn test_two_groups() {
        // a 4-clique and a 3-clique joined weakly: cluster 0 must be the
        // larger one
        let mut edges = Vec::new();
        for i in 0..4 {
            for j in (i + 1)..4 {
                edges.push((i, j, 1.0));
            }
        }
        for i in 4..7 {
            for j in (i + 1)..7 {
                edges.push((i, j, 1.0));
            }
        }
        edges.push((3, 4, 0.05));
        let mut adata = adata_with_graph(7, &edges);

        louvain_cluster(&mut adata, 1.0, 0).unwrap();
        let labels = adata.obs.get("louvain").unwrap().as_int().unwrap();
        assert_eq!(labels[..4], [0, 0, 0, 0]);
        assert_eq!(labels[4..], [1, 1, 1]);
    }

    #[test]
    fn test_determinism() {
        let edges = [(0, 1, 1.0), (1, 2, 1.0), (3, 4, 1.0), (4, 5, 1.0)];
        let mut a = adata_with_graph(6, &edges);
        let mut b = adata_with_graph(6, &edges);
        louvain_cluster(&mut a, 1.0, 3).unwrap();
        louvain_cluster(&mut b, 1.0, 3).unwrap();
        assert_eq!(
            a.obs.get("louvain").unwrap().as_int().unwrap(),
            b.obs.get("louvain").unwrap().as_int().unwrap()
        );
    }

    #[test]
    fn test_requires_graph() {
        let mut counts = TriMat::new((1, 1));
        counts.add_triplet(0, 0, 1.0);
        let mut adata = AnnMatrix::new(
            counts.to_csr(),
            MetaTable::new(vec!["c0".into()]),
            MetaTable::new(vec!["g0".into()]),
            vec!["G0".into()],
        )
        .unwrap();
        assert!(louvain_cluster(&mut adata, 1.0, 0).is_err());
    }

    #[test]
    fn test_relabel_by_size() {
        let labels = vec![2, 2, 2, 0, 0, 1];
        assert_eq!(relabel_by_size(&labels, 3), vec![0, 0, 0, 1, 1, 2]);
    }
}
