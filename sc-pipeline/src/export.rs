//! Flat-file export of the analysis: the processed matrix in MTX format,
//! obs/var annotation tables, embeddings and marker rankings.

use anyhow::{Context, Error};
use flate2::write::GzEncoder;
use flate2::Compression;
use itertools::Itertools;
use log::info;
use ndarray::Array2;
use sc_types::{AnnMatrix, MarkerTable, MetaTable};
use sprs::CsMat;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn gz_writer(path: &Path) -> Result<BufWriter<GzEncoder<File>>, Error> {
    let file = File::create(path).with_context(|| path.display().to_string())?;
    Ok(BufWriter::new(GzEncoder::new(file, Compression::default())))
}

/// Write the matrix back out as a 10x-style directory: `matrix.mtx.gz` in
/// genes x cells orientation plus `features.tsv.gz` and `barcodes.tsv.gz`.
/// `suffix` is appended to each file stem.
pub fn write_matrix_dir(adata: &AnnMatrix, dir: &Path, suffix: &str) -> Result<(), Error> {
    let mat = adata.matrix();

    let mut w = gz_writer(&dir.join(format!("matrix{suffix}.mtx.gz")))?;
    writeln!(w, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(w, "{} {} {}", mat.cols(), mat.rows(), mat.nnz())?;
    for (cell, row) in mat.outer_iterator().enumerate() {
        for (gene, &v) in row.iter() {
            writeln!(w, "{} {} {}", gene + 1, cell + 1, v)?;
        }
    }
    w.flush()?;

    let mut w = gz_writer(&dir.join(format!("features{suffix}.tsv.gz")))?;
    for (id, symbol) in adata.var.ids().iter().zip(&adata.gene_symbols) {
        writeln!(w, "{id}\t{symbol}")?;
    }
    w.flush()?;

    let mut w = gz_writer(&dir.join(format!("barcodes{suffix}.tsv.gz")))?;
    for barcode in adata.obs.ids() {
        writeln!(w, "{barcode}")?;
    }
    w.flush()?;
    Ok(())
}

/// Write a metadata table as a gzipped TSV with an `id` column first.
pub fn write_meta_tsv(table: &MetaTable, path: &Path) -> Result<(), Error> {
    let columns: Vec<&str> = table.column_names().collect();
    let mut w = gz_writer(path)?;
    writeln!(w, "id\t{}", columns.iter().join("\t"))?;
    for (i, id) in table.ids().iter().enumerate() {
        let values = columns
            .iter()
            .map(|&name| table.get(name).map_or_else(String::new, |c| c.value_to_string(i)))
            .join("\t");
        writeln!(w, "{id}\t{values}")?;
    }
    w.flush()?;
    Ok(())
}

/// Write an embedding as gzipped CSV, one row per cell.
pub fn write_embedding_csv(ids: &[String], coords: &Array2<f64>, path: &Path) -> Result<(), Error> {
    let mut w = gz_writer(path)?;
    let header = (0..coords.ncols()).map(|i| format!("dim{i}")).join(",");
    writeln!(w, "id,{header}")?;
    for (id, row) in ids.iter().zip(coords.rows()) {
        writeln!(w, "{},{}", id, row.iter().map(|v| v.to_string()).join(","))?;
    }
    w.flush()?;
    Ok(())
}

/// Write a sparse cell-by-cell graph as gzipped triplet CSV.
pub fn write_graph_csv(graph: &CsMat<f64>, path: &Path) -> Result<(), Error> {
    let mut w = gz_writer(path)?;
    writeln!(w, "row,col,value")?;
    for (i, row) in graph.outer_iterator().enumerate() {
        for (j, &v) in row.iter() {
            writeln!(w, "{i},{j},{v}")?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Write a marker ranking as plain CSV.
pub fn write_markers_csv(table: &MarkerTable, path: &Path) -> Result<(), Error> {
    let mut w = csv::Writer::from_path(path).with_context(|| path.display().to_string())?;
    w.write_record(["group", "gene", "score", "log2_fold_change", "p_value", "p_value_adj"])?;
    for row in table.rows() {
        w.write_record([
            row.group.as_str(),
            row.gene.as_str(),
            &row.score.to_string(),
            &row.log2_fold_change.to_string(),
            &row.p_value.to_string(),
            &row.p_value_adj.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Write everything the pipeline produced under `dir`: the matrix directory,
/// `obs.tsv.gz` / `var.tsv.gz`, one `<name>.csv.gz` per embedding and per
/// graph, and one `rank_genes_<group_by>.csv` per marker ranking. `suffix`
/// is appended to every file stem; pass `""` for the plain names.
pub fn export_all(adata: &AnnMatrix, dir: impl AsRef<Path>, suffix: &str) -> Result<(), Error> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).with_context(|| dir.display().to_string())?;

    write_matrix_dir(adata, dir, suffix)?;
    write_meta_tsv(&adata.obs, &dir.join(format!("obs{suffix}.tsv.gz")))?;
    write_meta_tsv(&adata.var, &dir.join(format!("var{suffix}.tsv.gz")))?;

    for (name, coords) in adata.embeddings() {
        write_embedding_csv(adata.obs.ids(), coords, &dir.join(format!("{name}{suffix}.csv.gz")))?;
    }
    for (name, graph) in adata.graphs() {
        write_graph_csv(graph, &dir.join(format!("{name}{suffix}.csv.gz")))?;
    }
    for (group_by, table) in adata.rankings() {
        write_markers_csv(table, &dir.join(format!("rank_genes_{group_by}{suffix}.csv")))?;
    }

    info!("exported analysis to {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use sc_types::{Column, MarkerRow};
    use sprs::TriMat;

    fn adata() -> AnnMatrix {
        let mut tri = TriMat::new((2, 3));
        tri.add_triplet(0, 0, 1.5);
        tri.add_triplet(1, 2, 2.5);
        let mut obs = MetaTable::new(vec!["c0".into(), "c1".into()]);
        obs.insert("louvain", Column::Int(vec![0, 1])).unwrap();
        let var = MetaTable::new(vec!["g0".into(), "g1".into(), "g2".into()]);
        let mut adata = AnnMatrix::new(
            tri.to_csr(),
            obs,
            var,
            vec!["G0".into(), "G1".into(), "G2".into()],
        )
        .unwrap();
        adata
            .add_embedding("X_umap", ndarray::arr2(&[[0.5, 1.0], [2.0, 3.0]]))
            .unwrap();
        let mut g = TriMat::new((2, 2));
        g.add_triplet(0, 1, 0.8);
        g.add_triplet(1, 0, 0.8);
        adata.add_graph("connectivities", g.to_csr()).unwrap();
        let mut table = MarkerTable::new("louvain");
        table.add_group(
            "0",
            vec![MarkerRow {
                gene: "G0".into(),
                group: "0".into(),
                score: 2.0,
                log2_fold_change: 1.0,
                p_value: 0.01,
                p_value_adj: 0.03,
            }],
        );
        adata.add_ranking(table);
        adata
    }

    #[test]
    fn test_export_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let adata = adata();
        export_all(&adata, dir.path(), "").unwrap();

        // the exported matrix loads back with identical shape and values
        let loaded = crate::mtx::load_mtx_dir(dir.path()).unwrap();
        assert_eq!(loaded.n_obs(), 2);
        assert_eq!(loaded.n_vars(), 3);
        assert_eq!(loaded.matrix().get(0, 0), Some(&1.5));
        assert_eq!(loaded.matrix().get(1, 2), Some(&2.5));

        for name in [
            "obs.tsv.gz",
            "var.tsv.gz",
            "X_umap.csv.gz",
            "connectivities.csv.gz",
            "rank_genes_louvain.csv",
        ] {
            assert!(dir.path().join(name).exists(), "{name} missing");
        }

        let markers = std::fs::read_to_string(dir.path().join("rank_genes_louvain.csv")).unwrap();
        let mut lines = markers.lines();
        assert_eq!(
            lines.next().unwrap(),
            "group,gene,score,log2_fold_change,p_value,p_value_adj"
        );
        assert!(lines.next().unwrap().starts_with("0,G0,2"));
    }

    #[test]
    fn test_export_with_suffix() {
        let dir = tempfile::tempdir().unwrap();
        export_all(&adata(), dir.path(), "_v2").unwrap();

        for name in [
            "matrix_v2.mtx.gz",
            "features_v2.tsv.gz",
            "barcodes_v2.tsv.gz",
            "obs_v2.tsv.gz",
            "var_v2.tsv.gz",
            "X_umap_v2.csv.gz",
            "connectivities_v2.csv.gz",
            "rank_genes_louvain_v2.csv",
        ] {
            assert!(dir.path().join(name).exists(), "{name} missing");
        }
        assert!(!dir.path().join("matrix.mtx.gz").exists());
    }

    #[test]
    fn test_graph_csv_lists_triplets() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = TriMat::new((2, 2));
        g.add_triplet(0, 1, 0.25);
        g.add_triplet(1, 0, 0.25);
        let path = dir.path().join("g.csv.gz");
        write_graph_csv(&g.to_csr(), &path).unwrap();

        let mut text = String::new();
        let file = std::fs::File::open(&path).unwrap();
        std::io::Read::read_to_string(&mut flate2::read::MultiGzDecoder::new(file), &mut text)
            .unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["row,col,value", "0,1,0.25", "1,0,0.25"]);
    }
}
