use serde::{Deserialize, Serialize};

use crate::error::SessionError;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_DURATION: f64 = 5.0;
/// Retry budget granted per requested mixture when none is given.
pub const ATTEMPTS_PER_MIXTURE: usize = 50;

/// How a stem is brought to the target length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitPolicy {
    /// Truncate all stems to the shortest, then keep its trailing window.
    Cut,
    /// Zero-extend (or truncate) each stem independently.
    #[default]
    Pad,
    /// Tile each stem until it covers the target, then truncate.
    Repeat,
}

/// Session-wide settings, fixed for the lifetime of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixConfig {
    pub sample_rate: u32,
    pub duration: f64,
    pub fit: FitPolicy,
    pub n_mixtures: usize,
    pub n_harmonic: usize,
    pub n_percussive: usize,
    pub base_stem: Option<String>,
    pub max_attempts: usize,
    pub seed: Option<u64>,
}

impl Default for MixConfig {
    fn default() -> Self {
        MixConfig::from_counts(5, 3, 0, 0)
    }
}

impl MixConfig {
    /// Builds a config from the stem counts as given on the command line.
    /// When the class counts do not add up to `n_stems` they are recomputed,
    /// favouring percussive stems on odd totals.
    pub fn from_counts(n_mixtures: usize, n_stems: usize, n_harmonic: usize, n_percussive: usize) -> MixConfig {
        let (n_harmonic, n_percussive) = if n_harmonic + n_percussive != n_stems {
            let h = n_stems / 2;
            (h, n_stems - h)
        } else {
            (n_harmonic, n_percussive)
        };

        MixConfig {
            sample_rate: DEFAULT_SAMPLE_RATE,
            duration: DEFAULT_DURATION,
            fit: FitPolicy::default(),
            n_mixtures,
            n_harmonic,
            n_percussive,
            base_stem: None,
            max_attempts: n_mixtures.saturating_mul(ATTEMPTS_PER_MIXTURE),
            seed: None,
        }
    }

    pub fn n_stems(&self) -> usize {
        self.n_harmonic + self.n_percussive
    }

    /// Length of every fitted stem and of the mixture, in samples.
    pub fn target_samples(&self) -> usize {
        (self.duration * self.sample_rate as f64).round() as usize
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.sample_rate == 0 {
            return Err(SessionError::Config("sample rate must be positive".into()));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(SessionError::Config(format!("duration must be positive, got {}", self.duration)));
        }
        if self.target_samples() == 0 {
            return Err(SessionError::Config("duration is shorter than one sample".into()));
        }
        if self.n_stems() == 0 {
            return Err(SessionError::Config("a mixture needs at least one stem".into()));
        }
        if self.n_mixtures == 0 {
            return Err(SessionError::Config("n_mixtures must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(SessionError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
