//! Building `index.csv` from a directory of stems and their metadata sidecars.
//!
//! Each `foo.wav` may sit next to a `foo.json` carrying
//! `{tempo, instrument_name, key, sound_class}`. Stems without a sidecar are
//! still indexed, with every field empty, so they show up as ineligible rather
//! than silently missing.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::IndexRow;
use crate::error::CatalogError;
use crate::types::TempoBin;

pub const DEFAULT_INDEX_FILE: &str = "index.csv";
pub const DEFAULT_BIN_WIDTH: f64 = 1.0;

/// Per-stem metadata as stored in the json sidecar. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StemMetadata {
    #[serde(default)]
    pub tempo: Option<f64>,
    #[serde(default)]
    pub instrument_name: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub sound_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexConfig {
    pub data_home: PathBuf,
    /// Written relative to `data_home` unless absolute.
    pub index_file: PathBuf,
    pub bin_width: f64,
}

impl IndexConfig {
    pub fn new(data_home: impl Into<PathBuf>) -> IndexConfig {
        IndexConfig {
            data_home: data_home.into(),
            index_file: PathBuf::from(DEFAULT_INDEX_FILE),
            bin_width: DEFAULT_BIN_WIDTH,
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_home.join(&self.index_file)
    }
}

/// Quantize a tempo to the nearest multiple of `bin_width`, in whole BPM.
pub fn tempo_bin(tempo: Option<f64>, bin_width: f64) -> Option<TempoBin> {
    let tempo = tempo.filter(|t| t.is_finite() && *t > 0.0)?;
    let bin = ((tempo / bin_width).round() * bin_width).round();
    (bin > 0.0).then(|| TempoBin::from_bpm(bin))
}

pub fn read_sidecar(path: &Path) -> Result<Option<StemMetadata>, CatalogError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| CatalogError::Sidecar {
            path: path.to_path_buf(),
            source,
        })
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("wav"))
}

/// One row per wav under `data_home`, sorted by stem name.
pub fn scan(config: &IndexConfig) -> Result<Vec<IndexRow>, CatalogError> {
    if !(config.bin_width.is_finite() && config.bin_width > 0.0) {
        return Err(CatalogError::BinWidth(config.bin_width));
    }
    let home = config.data_home.to_string_lossy().into_owned();

    let mut rows = Vec::new();
    for entry in WalkDir::new(&config.data_home).follow_links(true) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_wav(path) {
            continue;
        }

        let metadata = read_sidecar(&path.with_extension("json"))?.unwrap_or_else(|| {
            warn!(stem = %path.display(), "no metadata sidecar, indexing with empty fields");
            StemMetadata::default()
        });
        let stem_name = path
            .strip_prefix(&config.data_home)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        debug!(stem = %stem_name, tempo = ?metadata.tempo, "indexed");

        rows.push(IndexRow {
            stem_name,
            data_home: Some(home.clone()),
            tempo: metadata.tempo,
            tempo_bin: tempo_bin(metadata.tempo, config.bin_width).map(|bin| bin.to_string()),
            instrument_name: metadata.instrument_name,
            sound_class: metadata.sound_class,
            key: metadata.key,
        });
    }

    rows.sort_by(|a, b| a.stem_name.cmp(&b.stem_name));
    Ok(rows)
}

/// Scan `data_home` and write the index. Returns the number of rows written.
pub fn build(config: &IndexConfig) -> Result<usize, CatalogError> {
    let rows = scan(config)?;
    let path = config.index_path();
    let file = File::create(&path).map_err(|source| CatalogError::Io {
        path: path.clone(),
        source,
    })?;

    let mut writer = csv::Writer::from_writer(file);
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|source| CatalogError::Io {
        path: path.clone(),
        source,
    })?;

    info!(rows = rows.len(), index = %path.display(), "index written");
    Ok(rows.len())
}
