//! Persisting accepted mixtures.
//!
//! A mixture is written into a hidden staging directory next to its final
//! location and renamed into place once every file is on disk, so a mixture
//! directory either holds the complete set of files or does not exist.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{FitPolicy, MixConfig};
use crate::error::SessionError;
use crate::render;
use crate::types::{Mixture, SoundClass};

pub const MIXTURE_FILE: &str = "mixture.wav";
pub const METADATA_FILE: &str = "metadata.json";

/// File name of the k-th (zero based) stem of a mixture.
pub fn stem_file(k: usize) -> String {
    format!("stem{}.wav", k + 1)
}

/// Create `path` and any missing parents.
pub fn with_dir(path: &Path) -> Result<(), SessionError> {
    fs::create_dir_all(path).map_err(|source| SessionError::Persist {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemProvenance {
    pub file: String,
    pub stem_id: String,
    pub instrument_name: Option<String>,
    pub sound_class: SoundClass,
    pub tempo: Option<f64>,
    pub key: Option<String>,
    pub stretch_ratio: f64,
    pub first_beat_offset: f64,
    pub padding: usize,
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureMetadata {
    pub mixture_id: String,
    pub sample_rate: u32,
    pub duration: f64,
    pub fit: FitPolicy,
    pub base_stem_id: String,
    pub base_tempo: f64,
    pub stems: Vec<StemProvenance>,
    pub config: MixConfig,
}

impl MixtureMetadata {
    pub fn new(mixture: &Mixture, config: &MixConfig) -> MixtureMetadata {
        let stems = mixture
            .stems
            .iter()
            .enumerate()
            .map(|(k, stem)| StemProvenance {
                file: stem_file(k),
                stem_id: stem.record.stem_id.clone(),
                instrument_name: stem.record.instrument_name.clone(),
                sound_class: stem.record.sound_class,
                tempo: stem.record.tempo,
                key: stem.record.key.clone(),
                stretch_ratio: stem.stretch_ratio,
                first_beat_offset: stem.first_beat_offset,
                padding: stem.padding,
            })
            .collect();

        MixtureMetadata {
            mixture_id: mixture.mixture_id.to_string(),
            sample_rate: mixture.sample_rate,
            duration: mixture.duration,
            fit: config.fit,
            base_stem_id: mixture.base_stem_id.clone(),
            base_tempo: mixture.base_tempo,
            stems,
            config: config.clone(),
        }
    }
}

/// Writes mixtures under `root/<mixture_id>/`.
#[derive(Debug, Clone)]
pub struct MixtureWriter {
    root: PathBuf,
}

impl MixtureWriter {
    pub fn new(root: impl Into<PathBuf>) -> MixtureWriter {
        MixtureWriter { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mixture_dir(&self, mixture: &Mixture) -> PathBuf {
        self.root.join(mixture.mixture_id.to_string())
    }

    /// Write the mixture, its stems and metadata. Returns the mixture directory.
    pub fn persist(&self, mixture: &Mixture, config: &MixConfig) -> Result<PathBuf, SessionError> {
        with_dir(&self.root)?;

        let id = mixture.mixture_id.to_string();
        let staging = self.root.join(format!(".{}.partial", id));
        fs::create_dir(&staging).map_err(|source| SessionError::Persist {
            path: staging.clone(),
            source,
        })?;

        if let Err(e) = write_contents(&staging, mixture, config) {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "could not remove staging directory");
            }
            return Err(e);
        }

        let target = self.mixture_dir(mixture);
        if let Err(source) = fs::rename(&staging, &target) {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "could not remove staging directory");
            }
            return Err(SessionError::Persist { path: target, source });
        }
        debug!(path = %target.display(), "mixture written");
        Ok(target)
    }
}

fn write_contents(dir: &Path, mixture: &Mixture, config: &MixConfig) -> Result<(), SessionError> {
    render::samples_f32(mixture.sample_rate, &mixture.samples, &dir.join(MIXTURE_FILE))?;
    for (k, stem) in mixture.stems.iter().enumerate() {
        render::samples_f32(mixture.sample_rate, &stem.samples, &dir.join(stem_file(k)))?;
    }

    let metadata = MixtureMetadata::new(mixture, config);
    let path = dir.join(METADATA_FILE);
    let file = fs::File::create(&path).map_err(|source| SessionError::Persist { path, source })?;
    serde_json::to_writer_pretty(file, &metadata)?;
    Ok(())
}
