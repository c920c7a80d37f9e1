//! Loading of feature-barcode count matrices from a 10x-style MTX directory:
//! `matrix.mtx[.gz]` (genes x cells), `features.tsv[.gz]` and
//! `barcodes.tsv[.gz]`.

use anyhow::{bail, format_err, Context, Error};
use flate2::bufread::MultiGzDecoder;
use log::info;
use sc_types::{AnnMatrix, MetaTable};
use sprs::TriMat;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Open `<dir>/<base>.gz` if present, falling back to the uncompressed file.
fn open_maybe_gz(dir: &Path, base: &str) -> Result<Box<dyn BufRead>, Error> {
    let gz_path = dir.join(format!("{base}.gz"));
    if gz_path.exists() {
        let file = BufReader::new(File::open(&gz_path).with_context(|| gz_path.display().to_string())?);
        return Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))));
    }
    let path = dir.join(base);
    if path.exists() {
        let file = File::open(&path).with_context(|| path.display().to_string())?;
        return Ok(Box::new(BufReader::new(file)));
    }
    bail!("neither {} nor {} found", gz_path.display(), path.display())
}

/// Parse a MatrixMarket coordinate file of genes x cells counts, returned
/// transposed as a cells x genes CSR matrix.
fn load_counts(reader: Box<dyn BufRead>) -> Result<TriMat<f64>, Error> {
    let mut mat: Option<TriMat<f64>> = None;
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('%') || line.trim().is_empty() {
            continue;
        }
        let mut data = line.split_whitespace();
        match mat.as_mut() {
            None => {
                let nrow = data.next().ok_or_else(|| format_err!("no NROW"))?.parse::<usize>()?;
                let ncol = data.next().ok_or_else(|| format_err!("no NCOL"))?.parse::<usize>()?;
                let nnz = data.next().ok_or_else(|| format_err!("no NNZ"))?.parse::<usize>()?;
                // transposed: cells are the outer dimension
                mat = Some(TriMat::with_capacity((ncol, nrow), nnz));
            }
            Some(mat) => {
                let gene = data
                    .next()
                    .ok_or_else(|| format_err!("missing ROW"))?
                    .parse::<usize>()?
                    - 1;
                let cell = data
                    .next()
                    .ok_or_else(|| format_err!("missing COL"))?
                    .parse::<usize>()?
                    - 1;
                let val = data.next().ok_or_else(|| format_err!("missing VAL"))?.parse::<f64>()?;
                mat.add_triplet(cell, gene, val);
            }
        }
    }
    mat.ok_or_else(|| format_err!("no matrix found"))
}

/// Read a TSV of one record per line, keeping the first `columns` fields.
fn load_tsv(reader: Box<dyn BufRead>, columns: usize) -> Result<Vec<Vec<String>>, Error> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields: Vec<String> = line.split('\t').take(columns).map(String::from).collect();
        records.push(fields);
    }
    Ok(records)
}

/// Load a feature-barcode matrix directory into an [`AnnMatrix`] of raw
/// counts, cells as rows. `genes.tsv` is accepted as a legacy alias of
/// `features.tsv`.
pub fn load_mtx_dir(dir: impl AsRef<Path>) -> Result<AnnMatrix, Error> {
    let dir = dir.as_ref();
    let counts = load_counts(open_maybe_gz(dir, "matrix.mtx")?)
        .with_context(|| format!("reading counts from {}", dir.display()))?;
    let (n_cells, n_genes) = counts.shape();

    let features = match open_maybe_gz(dir, "features.tsv") {
        Ok(reader) => load_tsv(reader, 2)?,
        Err(_) => load_tsv(open_maybe_gz(dir, "genes.tsv")?, 2)?,
    };
    if features.len() != n_genes {
        bail!(
            "feature list has {} entries but matrix has {} genes",
            features.len(),
            n_genes
        );
    }

    let barcodes: Vec<String> = load_tsv(open_maybe_gz(dir, "barcodes.tsv")?, 1)?
        .into_iter()
        .map(|mut f| f.remove(0))
        .collect();
    if barcodes.len() != n_cells {
        bail!(
            "barcode list has {} entries but matrix has {} cells",
            barcodes.len(),
            n_cells
        );
    }

    let gene_ids: Vec<String> = features.iter().map(|f| f[0].clone()).collect();
    let gene_symbols: Vec<String> = features
        .iter()
        .map(|f| f.get(1).unwrap_or(&f[0]).clone())
        .collect();

    info!("loaded {} cells x {} genes from {}", n_cells, n_genes, dir.display());
    AnnMatrix::new(
        counts.to_csr(),
        MetaTable::new(barcodes),
        MetaTable::new(gene_ids),
        gene_symbols,
    )
}
