use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use stem_mixer::index::{self, IndexConfig, DEFAULT_BIN_WIDTH, DEFAULT_INDEX_FILE};

/// Index a stem directory from its json metadata sidecars.
#[derive(Parser, Debug)]
#[command(name = "build-index", version)]
struct Args {
    #[arg(long = "data_home")]
    data_home: PathBuf,

    /// Output file, relative to data_home
    #[arg(long = "index_file", default_value = DEFAULT_INDEX_FILE)]
    index_file: PathBuf,

    /// Tempo bin width in BPM
    #[arg(long = "bin_width", default_value_t = DEFAULT_BIN_WIDTH)]
    bin_width: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = IndexConfig {
        data_home: args.data_home,
        index_file: args.index_file,
        bin_width: args.bin_width,
    };
    let rows = index::build(&config)?;
    println!("{} ({} stems)", config.index_path().display(), rows);
    Ok(())
}
