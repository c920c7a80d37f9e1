//! Mapping of cluster labels to cell-type names.

use anyhow::{bail, Error};
use itertools::Itertools;
use log::info;
use sc_types::{AnnMatrix, Column};
use std::collections::BTreeMap;

/// Translate every label of obs column `source` through `mapping` and store
/// the result as obs column `target`. The mapping must be total over the
/// labels present: if any label is missing, the call fails and lists all of
/// them, leaving `obs` untouched.
pub fn annotate_clusters(
    adata: &mut AnnMatrix,
    source: &str,
    mapping: &BTreeMap<String, String>,
    target: &str,
) -> Result<(), Error> {
    let column = match adata.obs.get(source) {
        Some(c) => c,
        None => bail!("obs column '{}' not found", source),
    };

    let labels: Vec<String> = (0..column.len()).map(|i| column.value_to_string(i)).collect();
    let unmapped: Vec<&String> = labels
        .iter()
        .filter(|l| !mapping.contains_key(l.as_str()))
        .unique()
        .sorted()
        .collect();
    if !unmapped.is_empty() {
        bail!(
            "no cell type mapped for label(s) [{}] of column '{}'",
            unmapped.iter().join(", "),
            source
        );
    }

    let names: Vec<String> = labels.iter().map(|l| mapping[l].clone()).collect();
    let distinct = names.iter().unique().count();
    info!("annotated {} cells with {} distinct cell types", names.len(), distinct);
    adata.obs.insert(target, Column::Str(names))
}
