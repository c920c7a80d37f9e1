//! Marker-gene ranking: one-vs-rest differential expression per cluster.

use anyhow::{bail, Error};
use itertools::Itertools;
use log::info;
use ndarray::Array2;
use rayon::prelude::*;
use sc_types::{AnnMatrix, MarkerRow, MarkerTable};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::cmp::Ordering;
use std::str::FromStr;

/// Pseudocount guarding the fold-change ratio against empty groups.
const LFC_PSEUDOCOUNT: f64 = 1e-9;

/// Two-sample test used for scoring genes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffExpMethod {
    /// Welch's unequal-variance t-test.
    TTest,
    /// Wilcoxon rank-sum test with normal approximation and tie correction.
    Wilcoxon,
}

impl FromStr for DiffExpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "t_test" | "ttest" => Ok(DiffExpMethod::TTest),
            "wilcoxon" => Ok(DiffExpMethod::Wilcoxon),
            _ => bail!("differential expression method not recognized: {}", s),
        }
    }
}

/// Rank genes for every group of obs column `group_by` against all other
/// cells, storing a fresh [`MarkerTable`] on the matrix keyed by `group_by`.
/// When `groups` is given only those labels are tested; the rest of the cells
/// still form the comparison background. Expects log-normalized values.
pub fn rank_genes_groups(
    adata: &mut AnnMatrix,
    group_by: &str,
    method: DiffExpMethod,
    groups: Option<&[String]>,
) -> Result<(), Error> {
    let column = match adata.obs.get(group_by) {
        Some(c) => c,
        None => bail!("obs column '{}' not found", group_by),
    };
    let labels: Vec<String> = (0..column.len()).map(|i| column.value_to_string(i)).collect();
    let mut tested: Vec<String> = labels
        .iter()
        .unique()
        .cloned()
        .sorted_by_key(|l| (l.parse::<i64>().ok(), l.clone()))
        .collect();
    if tested.len() < 2 {
        bail!(
            "grouping column '{}' has {} distinct label(s), need at least 2",
            group_by,
            tested.len()
        );
    }
    if let Some(subset) = groups {
        for requested in subset {
            if !tested.contains(requested) {
                bail!("group '{}' not present in obs column '{}'", requested, group_by);
            }
        }
        tested.retain(|g| subset.contains(g));
    }

    let (n_cells, n_genes) = (adata.n_obs(), adata.n_vars());
    let mut dense = Array2::zeros((n_cells, n_genes));
    for (cell, row) in adata.matrix().outer_iterator().enumerate() {
        for (gene, &v) in row.iter() {
            dense[[cell, gene]] = v;
        }
    }

    let mut table = MarkerTable::new(group_by);
    for group in &tested {
        let in_group: Vec<usize> = (0..n_cells).filter(|&i| &labels[i] == group).collect();
        let rest: Vec<usize> = (0..n_cells).filter(|&i| &labels[i] != group).collect();

        let scored: Vec<(f64, f64, f64)> = (0..n_genes)
            .into_par_iter()
            .map(|gene| {
                let col = dense.column(gene);
                let a: Vec<f64> = in_group.iter().map(|&i| col[i]).collect();
                let b: Vec<f64> = rest.iter().map(|&i| col[i]).collect();

                let (score, p_value) = match method {
                    DiffExpMethod::TTest => welch_t(&a, &b),
                    DiffExpMethod::Wilcoxon => wilcoxon(&a, &b),
                };
                (score, p_value, log2_fold_change(&a, &b))
            })
            .collect();

        let p_values: Vec<(usize, f64)> = scored.iter().map(|&(_, p, _)| p).enumerate().collect();
        let mut adjusted = adjusted_pvalue_bh(&p_values);
        adjusted.sort_by_key(|&(i, _)| i);

        let rows: Vec<MarkerRow> = (0..n_genes)
            .map(|gene| MarkerRow {
                gene: adata.gene_symbols[gene].clone(),
                group: group.clone(),
                score: scored[gene].0,
                log2_fold_change: scored[gene].2,
                p_value: scored[gene].1,
                p_value_adj: adjusted[gene].1,
            })
            .collect();
        table.add_group(group, rows);
    }

    info!(
        "ranked {} genes across {} groups of '{}'",
        n_genes,
        tested.len(),
        group_by
    );
    adata.add_ranking(table);
    Ok(())
}

/// Welch's t statistic and two-sided p-value. Degenerate inputs (a group
/// smaller than two, or both variances zero) score 0 with p = 1.
fn welch_t(a: &[f64], b: &[f64]) -> (f64, f64) {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    if a.len() < 2 || b.len() < 2 {
        return (0.0, 1.0);
    }
    let (ma, va) = crate::stats::mean_var(a);
    let (mb, vb) = crate::stats::mean_var(b);
    let se2 = va / na + vb / nb;
    if se2 <= 0.0 {
        return (0.0, 1.0);
    }
    let t = (ma - mb) / se2.sqrt();

    // Welch-Satterthwaite degrees of freedom
    let df = se2 * se2 / ((va / na).powi(2) / (na - 1.0) + (vb / nb).powi(2) / (nb - 1.0));
    let p = match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => 1.0,
    };
    (t, p)
}

/// Wilcoxon rank-sum z statistic (normal approximation with tie correction)
/// and two-sided p-value.
fn wilcoxon(a: &[f64], b: &[f64]) -> (f64, f64) {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    if a.is_empty() || b.is_empty() {
        return (0.0, 1.0);
    }
    let n = na + nb;

    let mut combined: Vec<(f64, bool)> = a
        .iter()
        .map(|&v| (v, true))
        .chain(b.iter().map(|&v| (v, false)))
        .collect();
    combined.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(Ordering::Equal));

    // average ranks over ties, accumulating the tie correction term
    let mut rank_sum_a = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < combined.len() {
        let mut j = i;
        while j < combined.len() && combined[j].0 == combined[i].0 {
            j += 1;
        }
        let ties = (j - i) as f64;
        let rank = (i + j + 1) as f64 / 2.0;
        for entry in &combined[i..j] {
            if entry.1 {
                rank_sum_a += rank;
            }
        }
        tie_term += ties * ties * ties - ties;
        i = j;
    }

    let mu = na * (n + 1.0) / 2.0;
    let sigma2 = na * nb / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if sigma2 <= 0.0 {
        return (0.0, 1.0);
    }
    let z = (rank_sum_a - mu) / sigma2.sqrt();
    let p = match Normal::new(0.0, 1.0) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(z.abs())),
        Err(_) => 1.0,
    };
    (z, p)
}

/// Log2 fold change of un-logged group means, pseudocounted on both sides.
fn log2_fold_change(a: &[f64], b: &[f64]) -> f64 {
    let mean_expm1 = |xs: &[f64]| {
        if xs.is_empty() {
            0.0
        } else {
            xs.iter().map(|&x| x.exp_m1()).sum::<f64>() / xs.len() as f64
        }
    };
    ((mean_expm1(a) + LFC_PSEUDOCOUNT) / (mean_expm1(b) + LFC_PSEUDOCOUNT)).log2()
}

/// Benjamini-Hochberg adjustment. Takes and returns (index, p-value) pairs;
/// output order is by descending p-value.
pub fn adjusted_pvalue_bh(pvalue: &[(usize, f64)]) -> Vec<(usize, f64)> {
    // sort p-values, keeping the original indexes, NaNs to the front
    let mut arr = pvalue.to_vec();
    arr.sort_by(|&(_, a), &(_, b)| match a.partial_cmp(&b) {
        Some(o) => o.reverse(),
        None => {
            if a.is_nan() && b.is_nan() {
                Ordering::Equal
            } else if a.is_nan() {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    });

    // q = min(1, cummin(p * m / rank)) over descending p
    let len = arr.len() as f64;
    let mut min = f64::MAX;
    for (idx, (_, ref mut val)) in arr.iter_mut().enumerate() {
        *val *= len / (len - idx as f64);
        if *val < min {
            min = *val;
        }
        *val = min.min(1.0);
    }

    arr
}
