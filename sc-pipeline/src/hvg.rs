//! Highly-variable gene selection on log-normalized data.
//!
//! Means and dispersions are computed on the un-logged (expm1) values, moved
//! to log scale, and dispersions are z-scored against other genes of similar
//! mean expression (equal-width mean bins). A gene is flagged when its mean
//! falls inside the configured window and its normalized dispersion clears
//! the cutoff.

use anyhow::{bail, Error};
use log::info;
use sc_types::{AnnMatrix, Column};

use crate::stats::mean_var;

/// Selection parameters.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct HvgParams {
    /// Lower bound on log1p mean expression.
    pub min_mean: f64,
    /// Upper bound on log1p mean expression.
    pub max_mean: f64,
    /// Lower bound on the bin-normalized dispersion.
    pub min_disp: f64,
    /// Number of equal-width mean bins used for dispersion normalization.
    pub n_bins: usize,
}

impl Default for HvgParams {
    fn default() -> HvgParams {
        HvgParams {
            min_mean: 0.0125,
            max_mean: 3.0,
            min_disp: 0.5,
            n_bins: 20,
        }
    }
}

/// Annotate `var` with `means`, `dispersions`, `dispersions_norm` and the
/// boolean `highly_variable` flag. Expects log-normalized values in the
/// matrix.
pub fn highly_variable_genes(adata: &mut AnnMatrix, params: &HvgParams) -> Result<(), Error> {
    if params.n_bins == 0 {
        bail!("n_bins must be at least 1");
    }
    let (n_cells, n_genes) = (adata.n_obs(), adata.n_vars());
    if n_cells == 0 || n_genes == 0 {
        bail!("cannot select variable genes from an empty matrix");
    }

    // per-gene moments of expm1(x), accumulated column-wise over the CSR rows
    let mut sums = vec![0.0; n_genes];
    let mut sq_sums = vec![0.0; n_genes];
    for row in adata.matrix().outer_iterator() {
        for (gene, &v) in row.iter() {
            let x = v.exp_m1();
            sums[gene] += x;
            sq_sums[gene] += x * x;
        }
    }

    let mut means = vec![0.0; n_genes];
    let mut dispersions = vec![f64::NAN; n_genes];
    for g in 0..n_genes {
        let mean = sums[g] / n_cells as f64;
        // implicit zeros contribute only to the denominator
        let var = if n_cells > 1 {
            (sq_sums[g] - sums[g] * mean) / (n_cells - 1) as f64
        } else {
            0.0
        };
        if mean > 0.0 && var > 0.0 {
            dispersions[g] = (var / mean).ln();
        }
        means[g] = mean.ln_1p();
    }

    let dispersions_norm = normalize_dispersions(&means, &dispersions, params.n_bins);

    let highly_variable: Vec<bool> = (0..n_genes)
        .map(|g| {
            means[g] > params.min_mean
                && means[g] < params.max_mean
                && dispersions_norm[g].is_finite()
                && dispersions_norm[g] > params.min_disp
        })
        .collect();
    let n_hvg = highly_variable.iter().filter(|&&h| h).count();
    info!("{} of {} genes flagged highly variable", n_hvg, n_genes);

    adata.var.insert("means", Column::Float(means))?;
    adata.var.insert("dispersions", Column::Float(dispersions))?;
    adata.var.insert("dispersions_norm", Column::Float(dispersions_norm))?;
    adata.var.insert("highly_variable", Column::Bool(highly_variable))?;
    Ok(())
}

/// Z-score dispersions within equal-width mean bins. Genes in bins with fewer
/// than two finite dispersions get a normalized dispersion of 0.
fn normalize_dispersions(means: &[f64], dispersions: &[f64], n_bins: usize) -> Vec<f64> {
    let lo = means.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = means.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let width = (hi - lo) / n_bins as f64;

    let bin_of = |mean: f64| -> usize {
        if width <= 0.0 {
            return 0;
        }
        (((mean - lo) / width) as usize).min(n_bins - 1)
    };

    let mut binned: Vec<Vec<f64>> = vec![Vec::new(); n_bins];
    for (g, &d) in dispersions.iter().enumerate() {
        if d.is_finite() {
            binned[bin_of(means[g])].push(d);
        }
    }
    let bin_stats: Vec<(f64, f64)> = binned.iter().map(|b| mean_var(b)).collect();

    dispersions
        .iter()
        .enumerate()
        .map(|(g, &d)| {
            if !d.is_finite() {
                return f64::NAN;
            }
            let (bin_mean, bin_var) = bin_stats[bin_of(means[g])];
            if bin_var > 0.0 {
                (d - bin_mean) / bin_var.sqrt()
            } else {
                0.0
            }
        })
        .collect()
}

/// Narrow the matrix to the genes flagged by [`highly_variable_genes`].
pub fn subset_to_highly_variable(adata: AnnMatrix) -> Result<AnnMatrix, Error> {
    let flags = match adata.var.get("highly_variable").and_then(Column::as_bool) {
        Some(flags) => flags,
        None => bail!("var column 'highly_variable' missing, run highly_variable_genes first"),
    };
    let keep: Vec<usize> = flags
        .iter()
        .enumerate()
        .filter_map(|(g, &h)| h.then_some(g))
        .collect();
    if keep.is_empty() {
        bail!("no genes were flagged highly variable");
    }
    adata.subset_genes(&keep)
}
