use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Range;

/// One (gene, group) entry of a differential-expression ranking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerRow {
    pub gene: String,
    pub group: String,
    pub score: f64,
    pub log2_fold_change: f64,
    pub p_value: f64,
    pub p_value_adj: f64,
}

/// Ranked marker genes for every group of one grouping column.
///
/// Rows are stored in contiguous per-group blocks, each sorted by score in
/// non-increasing order. A fresh table is produced per ranking call; it never
/// mutates a previously computed table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarkerTable {
    /// Name of the obs column the grouping was taken from.
    pub group_by: String,
    rows: Vec<MarkerRow>,
    groups: Vec<(String, Range<usize>)>,
}

impl MarkerTable {
    pub fn new(group_by: &str) -> MarkerTable {
        MarkerTable {
            group_by: group_by.to_string(),
            rows: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Append one group's rows, sorting them by descending score. NaN scores
    /// sink to the end.
    pub fn add_group(&mut self, group: &str, mut rows: Vec<MarkerRow>) {
        rows.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
            (false, false) => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
        });
        let start = self.rows.len();
        self.rows.extend(rows);
        self.groups.push((group.to_string(), start..self.rows.len()));
    }

    pub fn rows(&self) -> &[MarkerRow] {
        &self.rows
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    pub fn group(&self, name: &str) -> Option<&[MarkerRow]> {
        self.groups
            .iter()
            .find(|(g, _)| g == name)
            .map(|(_, range)| &self.rows[range.clone()])
    }

    /// The `n` best-scoring rows of a group.
    pub fn top_n(&self, name: &str, n: usize) -> Option<&[MarkerRow]> {
        self.group(name).map(|rows| &rows[..n.min(rows.len())])
    }
}
