//! End-to-end single-cell RNA-seq analysis: QC filtering, normalization,
//! highly-variable gene selection, PCA, neighbor graphs, graph clustering,
//! UMAP embedding, cluster annotation and marker-gene ranking.

#![deny(missing_docs)]

pub mod annotate;
pub mod cluster;
pub mod diff_exp;
pub mod dim_red;
pub mod embed;
pub mod export;
pub mod hvg;
pub mod mtx;
pub mod nn;
pub mod normalization;
pub mod pipeline;
pub mod qc;
pub mod stats;
