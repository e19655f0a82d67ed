use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use stem_mixer::config::{FitPolicy, MixConfig, DEFAULT_DURATION, DEFAULT_SAMPLE_RATE};
use stem_mixer::files::MixtureWriter;
use stem_mixer::index::DEFAULT_INDEX_FILE;
use stem_mixer::{MixtureSession, StemCatalog};

/// Build synthetic mixtures from tempo-compatible stems.
#[derive(Parser, Debug)]
#[command(name = "stem-mixer", version)]
struct Args {
    /// Directory holding the stems and their index
    #[arg(long = "data_home")]
    data_home: PathBuf,

    #[arg(long = "output_folder", default_value = "mixtures")]
    output_folder: PathBuf,

    /// Mixture length in seconds
    #[arg(long, default_value_t = DEFAULT_DURATION)]
    duration: f64,

    #[arg(long = "n_mixtures", default_value_t = 5)]
    n_mixtures: usize,

    #[arg(long = "n_stems", default_value_t = 3)]
    n_stems: usize,

    #[arg(long = "n_harmonic", default_value_t = 0)]
    n_harmonic: usize,

    #[arg(long = "n_percussive", default_value_t = 0)]
    n_percussive: usize,

    /// Index file, relative to data_home
    #[arg(long = "index_file", default_value = DEFAULT_INDEX_FILE)]
    index_file: PathBuf,

    #[arg(long = "sample_rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    #[arg(long, value_enum, default_value_t = FitPolicy::Pad)]
    fit: FitPolicy,

    /// Attempts allowed before giving up (default: 50 per mixture)
    #[arg(long = "max_attempts")]
    max_attempts: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Use this stem as the base of every mixture
    #[arg(long = "base_stem")]
    base_stem: Option<String>,
}

impl Args {
    fn mix_config(&self) -> MixConfig {
        let mut config = MixConfig::from_counts(self.n_mixtures, self.n_stems, self.n_harmonic, self.n_percussive);
        config.sample_rate = self.sample_rate;
        config.duration = self.duration;
        config.fit = self.fit;
        config.seed = self.seed;
        config.base_stem = self.base_stem.clone();
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.mix_config();

    let index_path = args.data_home.join(&args.index_file);
    let catalog = StemCatalog::load(&index_path)
        .with_context(|| format!("loading stem index {}", index_path.display()))?;
    info!(
        stems = catalog.len(),
        eligible = catalog.eligible_count(),
        harmonic = config.n_harmonic,
        percussive = config.n_percussive,
        "catalog loaded"
    );

    let session = MixtureSession::new(&catalog, config, MixtureWriter::new(&args.output_folder));
    let report = session.run()?;

    for mixture in &report.accepted {
        println!("{}", mixture.directory.display());
    }
    Ok(())
}
