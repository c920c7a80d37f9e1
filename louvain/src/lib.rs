//! Modularity-based community detection over weighted undirected graphs.
//!
//! The driver runs greedy local moving of nodes between communities, then
//! aggregates the graph by community and recurses, in the style of the
//! classic Louvain algorithm. All randomness comes from a caller-supplied
//! seed, so identical inputs and seeds produce identical labelings.
#![deny(missing_docs)]

/// Assignment of nodes to clusters
pub mod clustering;

/// Weighted undirected graph in adjacency form
pub mod network;

/// Louvain driver
pub mod louvain;

mod local_moving;

pub use clustering::Clustering;
pub use louvain::Louvain;
pub use network::Network;
