//! Two-dimensional UMAP embedding of the neighbor graph.

use anyhow::{bail, Error};
use log::info;
use sc_types::AnnMatrix;
use umap_embed::Umap;

/// Embed the cells into two dimensions from the `connectivities` graph and
/// store the result as `X_umap`. Deterministic for a fixed seed.
pub fn umap(adata: &mut AnnMatrix, min_dist: f64, seed: u64) -> Result<(), Error> {
    let graph = match adata.graph("connectivities") {
        Some(g) => g,
        None => bail!("graph 'connectivities' missing, run neighbors first"),
    };

    let params = Umap {
        min_dist,
        ..Umap::default()
    };
    info!("computing UMAP for {} cells with min_dist {}", adata.n_obs(), min_dist);
    let coords = params.embed_graph(graph, seed);
    adata.add_embedding("X_umap", coords)
}
