// Command line driver for the single-cell analysis pipeline

use anyhow::Error;
use clap::{value_parser, Arg, Command};
use log::info;
use sc_pipeline::pipeline::{run, PipelineConfig};
use std::path::PathBuf;

pub fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("sc-pipeline-cmd")
        .arg(
            Arg::new("INPUT")
                .help("Matrix directory (matrix.mtx[.gz], features.tsv[.gz], barcodes.tsv[.gz])")
                .required(true)
                .index(1)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("OUT_DIR")
                .help("Output directory")
                .short('o')
                .long("out_dir")
                .default_value(".")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("CONFIG")
                .help("JSON config file; omitted fields take their defaults")
                .short('c')
                .long("config")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("NUM_PCS")
                .help("Number of principal components fed to the neighbor search")
                .short('d')
                .long("num_pcs")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("NUM_NEIGHBORS")
                .help("Neighbors per cell in the kNN graph")
                .short('k')
                .long("num_neighbors")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("RESOLUTION")
                .help("Louvain resolution")
                .short('r')
                .long("resolution")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("METHOD")
                .help("Marker-gene scoring method")
                .short('m')
                .long("method")
                .value_parser(["t_test", "wilcoxon"]),
        )
        .arg(
            Arg::new("SUFFIX")
                .help("Tag appended to every output filename stem")
                .long("suffix")
                .value_parser(value_parser!(String)),
        )
        .arg(
            Arg::new("SEED")
                .help("Random seed for clustering and embedding")
                .short('s')
                .long("seed")
                .value_parser(value_parser!(u64)),
        )
        .get_matches();

    let input: &PathBuf = matches.get_one("INPUT").unwrap();
    let out_dir: &PathBuf = matches.get_one("OUT_DIR").unwrap();

    let mut config = match matches.get_one::<PathBuf>("CONFIG") {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(&n_pcs) = matches.get_one("NUM_PCS") {
        config.n_pcs = n_pcs;
    }
    if let Some(&n_neighbors) = matches.get_one("NUM_NEIGHBORS") {
        config.n_neighbors = n_neighbors;
    }
    if let Some(&resolution) = matches.get_one("RESOLUTION") {
        config.resolution = resolution;
    }
    if let Some(method) = matches.get_one::<String>("METHOD") {
        config.method = method.parse()?;
    }
    if let Some(&seed) = matches.get_one("SEED") {
        config.seed = seed;
    }
    if let Some(suffix) = matches.get_one::<String>("SUFFIX") {
        config.out_suffix = suffix.clone();
    }

    let adata = run(input, Some(out_dir), &config)?;
    info!(
        "done: {} cells x {} genes analyzed, results in {}",
        adata.n_obs(),
        adata.n_vars(),
        out_dir.display()
    );
    Ok(())
}
