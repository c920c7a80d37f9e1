//! Core data types shared across the single-cell analysis pipeline.

pub mod marker;
pub mod matrix;
pub mod meta;

pub use marker::{MarkerRow, MarkerTable};
pub use matrix::AnnMatrix;
pub use meta::{Column, MetaTable};
