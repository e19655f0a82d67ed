//! Error types for the mixture pipeline.
//!
//! Catalog and configuration errors end a session. Everything wrapped by
//! [`AttemptError`] only ends the current attempt; the session logs it and
//! draws a fresh selection.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::SoundClass;

/// Failure to load the stem index.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot read index {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed index: {0}")]
    Csv(#[from] csv::Error),

    #[error("index is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("stem '{0}' appears more than once in the index")]
    DuplicateStem(String),

    #[error("malformed stem metadata {path}: {source}")]
    Sidecar {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot scan stem directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("tempo bin width must be positive, got {0}")]
    BinWidth(f64),
}

/// Why a selection could not be drawn. Always retryable with a new draw.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionFailure {
    #[error("stem '{0}' is not in the catalog")]
    UnknownStem(String),

    #[error("stem '{0}' has no tempo bin or sound class")]
    IneligibleStem(String),

    #[error("base stem '{0}' has neither a numeric tempo bin nor a tempo")]
    NoBaseTempo(String),

    #[error("no eligible stem matches the requested pool")]
    EmptyPool,

    #[error("needed {requested} {class} stems, only {available} compatible")]
    InsufficientPool {
        class: SoundClass,
        requested: usize,
        available: usize,
    },

    #[error("instrument '{0}' selected twice")]
    DuplicateInstrument(String),

    #[error("selected {actual} stems, expected {expected}")]
    CountMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("wav error on {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("unsupported sample format in {path}: {bits}-bit {format:?}")]
    UnsupportedFormat {
        path: PathBuf,
        bits: u16,
        format: hound::SampleFormat,
    },

    #[error("{0} contains no samples")]
    Empty(PathBuf),

    #[error("cannot build resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StretchError {
    #[error("stretch rate must be finite and positive, got {0}")]
    InvalidRate(f64),

    #[error("cannot stretch an empty buffer")]
    EmptyInput,
}

/// Reasons a single mixture attempt is abandoned.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("selection failed: {0}")]
    Selection(#[from] SelectionFailure),

    #[error("stem '{stem_id}' has no usable tempo")]
    MissingTempo { stem_id: String },

    #[error("cannot decode stem '{stem_id}': {source}")]
    Decode {
        stem_id: String,
        #[source]
        source: AudioError,
    },

    #[error("cannot stretch stem '{stem_id}': {source}")]
    Stretch {
        stem_id: String,
        #[source]
        source: StretchError,
    },

    #[error("no beat detected in stem '{stem_id}'")]
    NoBeatDetected { stem_id: String },

    #[error("stem '{stem_id}' is empty or silent after fitting")]
    EmptyStem { stem_id: String },

    #[error("shortest stem has {available} samples, {required} required")]
    ShortStem { available: usize, required: usize },
}

impl AttemptError {
    /// The stem responsible for the failure, when one can be singled out.
    pub fn stem_id(&self) -> Option<&str> {
        match self {
            AttemptError::MissingTempo { stem_id }
            | AttemptError::Decode { stem_id, .. }
            | AttemptError::Stretch { stem_id, .. }
            | AttemptError::NoBeatDetected { stem_id }
            | AttemptError::EmptyStem { stem_id } => Some(stem_id),
            AttemptError::Selection(SelectionFailure::UnknownStem(id))
            | AttemptError::Selection(SelectionFailure::IneligibleStem(id))
            | AttemptError::Selection(SelectionFailure::NoBaseTempo(id)) => Some(id),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("retry budget exhausted after {attempts} attempts: {accepted}/{requested} mixtures produced")]
    ExhaustedRetries {
        accepted: usize,
        requested: usize,
        attempts: usize,
    },

    #[error("cannot persist mixture to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write audio for mixture: {0}")]
    PersistAudio(#[from] AudioError),

    #[error("cannot write mixture metadata: {0}")]
    PersistMetadata(#[from] serde_json::Error),
}
