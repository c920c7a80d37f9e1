use crate::marker::MarkerTable;
use crate::meta::MetaTable;
use anyhow::{bail, ensure, Error};
use ndarray::{Array2, Axis};
use sprs::CsMat;
use std::collections::BTreeMap;

/// An annotated cell-by-gene matrix.
///
/// The count matrix is CSR with rows = cells and columns = genes. Per-cell
/// metadata lives in `obs`, per-gene metadata in `var`; derived embeddings
/// (cells x k) and cell-by-cell graphs are stored by name. The row count of
/// the matrix always equals `obs.len()` and the column count always equals
/// `var.len()`; subsetting goes through [`AnnMatrix::subset_cells`] /
/// [`AnnMatrix::subset_genes`], which narrow every derived structure in the
/// same operation so no stale view can survive a filter.
#[derive(Clone, Debug)]
pub struct AnnMatrix {
    matrix: CsMat<f64>,
    pub obs: MetaTable,
    pub var: MetaTable,
    /// Gene display names (symbols), parallel to `var` ids.
    pub gene_symbols: Vec<String>,
    embeddings: BTreeMap<String, Array2<f64>>,
    graphs: BTreeMap<String, CsMat<f64>>,
    rankings: BTreeMap<String, MarkerTable>,
    /// Unstructured numeric metadata (e.g. PCA variance ratios).
    pub uns: BTreeMap<String, Vec<f64>>,
}

impl AnnMatrix {
    pub fn new(
        matrix: CsMat<f64>,
        obs: MetaTable,
        var: MetaTable,
        gene_symbols: Vec<String>,
    ) -> Result<AnnMatrix, Error> {
        ensure!(matrix.is_csr(), "cell-by-gene matrix must be CSR");
        ensure!(
            matrix.rows() == obs.len(),
            "matrix has {} rows but obs has {} entries",
            matrix.rows(),
            obs.len()
        );
        ensure!(
            matrix.cols() == var.len(),
            "matrix has {} cols but var has {} entries",
            matrix.cols(),
            var.len()
        );
        ensure!(
            gene_symbols.len() == var.len(),
            "gene symbol list has {} entries but var has {}",
            gene_symbols.len(),
            var.len()
        );
        Ok(AnnMatrix {
            matrix,
            obs,
            var,
            gene_symbols,
            embeddings: BTreeMap::new(),
            graphs: BTreeMap::new(),
            rankings: BTreeMap::new(),
            uns: BTreeMap::new(),
        })
    }

    pub fn n_obs(&self) -> usize {
        self.matrix.rows()
    }

    pub fn n_vars(&self) -> usize {
        self.matrix.cols()
    }

    pub fn matrix(&self) -> &CsMat<f64> {
        &self.matrix
    }

    /// Replace the matrix values, e.g. after normalization. The replacement
    /// must have identical shape; annotations are untouched.
    pub fn set_matrix(&mut self, matrix: CsMat<f64>) -> Result<(), Error> {
        ensure!(matrix.is_csr(), "replacement matrix must be CSR");
        ensure!(
            matrix.rows() == self.matrix.rows() && matrix.cols() == self.matrix.cols(),
            "replacement matrix shape ({}, {}) differs from ({}, {})",
            matrix.rows(),
            matrix.cols(),
            self.matrix.rows(),
            self.matrix.cols()
        );
        self.matrix = matrix;
        Ok(())
    }

    pub fn add_embedding(&mut self, name: &str, coords: Array2<f64>) -> Result<(), Error> {
        ensure!(
            coords.nrows() == self.n_obs(),
            "embedding '{}' has {} rows but matrix has {} cells",
            name,
            coords.nrows(),
            self.n_obs()
        );
        self.embeddings.insert(name.to_string(), coords);
        Ok(())
    }

    pub fn embedding(&self, name: &str) -> Option<&Array2<f64>> {
        self.embeddings.get(name)
    }

    pub fn embeddings(&self) -> impl Iterator<Item = (&str, &Array2<f64>)> {
        self.embeddings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn add_graph(&mut self, name: &str, graph: CsMat<f64>) -> Result<(), Error> {
        ensure!(
            graph.rows() == self.n_obs() && graph.cols() == self.n_obs(),
            "graph '{}' has shape ({}, {}) but matrix has {} cells",
            name,
            graph.rows(),
            graph.cols(),
            self.n_obs()
        );
        self.graphs.insert(name.to_string(), graph);
        Ok(())
    }

    pub fn graph(&self, name: &str) -> Option<&CsMat<f64>> {
        self.graphs.get(name)
    }

    pub fn graphs(&self) -> impl Iterator<Item = (&str, &CsMat<f64>)> {
        self.graphs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Store a marker ranking keyed by the grouping column that produced it.
    /// Rankings under other grouping columns are left untouched.
    pub fn add_ranking(&mut self, table: MarkerTable) {
        self.rankings.insert(table.group_by.clone(), table);
    }

    pub fn ranking(&self, group_by: &str) -> Option<&MarkerTable> {
        self.rankings.get(group_by)
    }

    pub fn rankings(&self) -> impl Iterator<Item = (&str, &MarkerTable)> {
        self.rankings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keep only the cells listed in `keep` (strictly increasing row indices).
    /// Consumes the value; the matrix, obs table, every embedding and every
    /// graph are narrowed together.
    pub fn subset_cells(self, keep: &[usize]) -> Result<AnnMatrix, Error> {
        check_indices(keep, self.n_obs(), "cell")?;
        let matrix = subset_csr(&self.matrix, Some(keep), None);
        let obs = self.obs.subset(keep);
        let embeddings = self
            .embeddings
            .iter()
            .map(|(name, e)| (name.clone(), e.select(Axis(0), keep)))
            .collect();
        let graphs = self
            .graphs
            .iter()
            .map(|(name, g)| (name.clone(), subset_csr(g, Some(keep), Some(keep))))
            .collect();
        Ok(AnnMatrix {
            matrix,
            obs,
            var: self.var,
            gene_symbols: self.gene_symbols,
            embeddings,
            graphs,
            rankings: self.rankings,
            uns: self.uns,
        })
    }

    /// Keep only the genes listed in `keep` (strictly increasing column
    /// indices). Embeddings and graphs are cell-indexed and unaffected.
    pub fn subset_genes(self, keep: &[usize]) -> Result<AnnMatrix, Error> {
        check_indices(keep, self.n_vars(), "gene")?;
        let matrix = subset_csr(&self.matrix, None, Some(keep));
        let var = self.var.subset(keep);
        let gene_symbols = keep.iter().map(|&i| self.gene_symbols[i].clone()).collect();
        Ok(AnnMatrix {
            matrix,
            obs: self.obs,
            var,
            gene_symbols,
            embeddings: self.embeddings,
            graphs: self.graphs,
            rankings: self.rankings,
            uns: self.uns,
        })
    }
}

fn check_indices(keep: &[usize], bound: usize, what: &str) -> Result<(), Error> {
    let mut prev = None;
    for &i in keep {
        if i >= bound {
            bail!("{} index {} out of bounds ({} total)", what, i, bound);
        }
        if let Some(p) = prev {
            if i <= p {
                bail!("{} indices must be strictly increasing", what);
            }
        }
        prev = Some(i);
    }
    Ok(())
}

/// Subset a CSR matrix by row and/or column indices (strictly increasing).
fn subset_csr(mat: &CsMat<f64>, rows: Option<&[usize]>, cols: Option<&[usize]>) -> CsMat<f64> {
    let col_map: Option<Vec<Option<usize>>> = cols.map(|cols| {
        let mut map = vec![None; mat.cols()];
        for (new, &old) in cols.iter().enumerate() {
            map[old] = Some(new);
        }
        map
    });

    let n_rows = rows.map_or(mat.rows(), <[usize]>::len);
    let n_cols = cols.map_or(mat.cols(), <[usize]>::len);

    let mut indptr = Vec::with_capacity(n_rows + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();
    indptr.push(0);

    let mut push_row = |row: usize| {
        if let Some(vec) = mat.outer_view(row) {
            for (col, &v) in vec.iter() {
                match &col_map {
                    Some(map) => {
                        if let Some(new_col) = map[col] {
                            indices.push(new_col);
                            data.push(v);
                        }
                    }
                    None => {
                        indices.push(col);
                        data.push(v);
                    }
                }
            }
        }
        indptr.push(indices.len());
    };

    match rows {
        Some(rows) => rows.iter().for_each(|&r| push_row(r)),
        None => (0..mat.rows()).for_each(push_row),
    }

    CsMat::new((n_rows, n_cols), indptr, indices, data)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::Column;
    use ndarray::arr2;
    use sprs::TriMat;

    fn tiny() -> AnnMatrix {
        // 3 cells x 4 genes
        let mut tri = TriMat::new((3, 4));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(0, 2, 2.0);
        tri.add_triplet(1, 1, 3.0);
        tri.add_triplet(2, 3, 4.0);
        let obs = MetaTable::new(vec!["c0", "c1", "c2"].into_iter().map(String::from).collect());
        let var = MetaTable::new(vec!["g0", "g1", "g2", "g3"].into_iter().map(String::from).collect());
        let symbols = vec!["G0", "G1", "G2", "G3"].into_iter().map(String::from).collect();
        AnnMatrix::new(tri.to_csr(), obs, var, symbols).unwrap()
    }

    #[test]
    fn test_dimension_checks() {
        let adata = tiny();
        assert_eq!(adata.n_obs(), 3);
        assert_eq!(adata.n_vars(), 4);

        let mut adata = adata;
        // wrong-sized embedding is rejected
        assert!(adata.add_embedding("x", Array2::zeros((2, 2))).is_err());
        assert!(adata.add_embedding("x", Array2::zeros((3, 2))).is_ok());
    }

    #[test]
    fn test_subset_cells_narrows_everything() {
        let mut adata = tiny();
        adata
            .add_embedding("pca", arr2(&[[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]]))
            .unwrap();
        let mut g = TriMat::new((3, 3));
        g.add_triplet(0, 1, 1.0);
        g.add_triplet(1, 2, 1.0);
        adata.add_graph("knn", g.to_csr()).unwrap();
        adata.obs.insert("total", Column::Float(vec![3.0, 3.0, 4.0])).unwrap();

        let sub = adata.subset_cells(&[0, 2]).unwrap();
        assert_eq!(sub.n_obs(), 2);
        assert_eq!(sub.obs.len(), 2);
        assert_eq!(sub.obs.ids(), &["c0".to_string(), "c2".to_string()]);
        assert_eq!(sub.embedding("pca").unwrap().nrows(), 2);
        let g = sub.graph("knn").unwrap();
        assert_eq!((g.rows(), g.cols()), (2, 2));
        // the c1->c2 edge is gone, both endpoints involved a dropped cell
        assert_eq!(g.nnz(), 0);
    }

    #[test]
    fn test_subset_genes() {
        let adata = tiny();
        let sub = adata.subset_genes(&[0, 2, 3]).unwrap();
        assert_eq!(sub.n_vars(), 3);
        assert_eq!(sub.var.ids(), &["g0".to_string(), "g2".to_string(), "g3".to_string()]);
        assert_eq!(sub.gene_symbols, vec!["G0", "G2", "G3"]);
        // g2 was column 2, now column 1
        assert_eq!(sub.matrix().get(0, 1), Some(&2.0));
        assert_eq!(sub.matrix().get(2, 2), Some(&4.0));
    }

    #[test]
    fn test_bad_indices() {
        let adata = tiny();
        assert!(adata.clone().subset_cells(&[0, 0]).is_err());
        assert!(adata.clone().subset_cells(&[5]).is_err());
        assert!(adata.subset_genes(&[2, 1]).is_err());
    }
}
