//! The mixture session: repeated attempts until enough mixtures are accepted
//! or the retry budget runs out.
//!
//! Every attempt walks one candidate through
//! `Selecting -> Normalizing -> Aligning -> Assembling -> Accepted`. Any failure
//! sends it to `Rejected` and the candidate, with all of its buffers, is
//! dropped. Attempts in a round run in parallel; each owns its random stream
//! and its buffers and only reads the shared catalog and oracles.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::align;
use crate::beats::{BeatTracker, OnsetTracker};
use crate::catalog::StemCatalog;
use crate::config::MixConfig;
use crate::error::{AttemptError, SessionError};
use crate::files::MixtureWriter;
use crate::mix;
use crate::reader::{StemSource, WavSource};
use crate::select;
use crate::stretch::{SignalsmithStretcher, TimeStretch};
use crate::tempo;
use crate::types::{Mixture, SampleBuffer, SelectedStem};

/// Stems failing at least this often within a session are reported.
pub const REPEAT_OFFENDER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Selecting,
    Normalizing,
    Aligning,
    Assembling,
    Accepted,
    Rejected,
}

/// Working state of one attempt.
#[derive(Debug)]
pub struct MixtureCandidate {
    pub base_stem_id: Option<String>,
    pub base_tempo: Option<f64>,
    pub stems: Vec<SelectedStem>,
    pub target_duration: f64,
    pub stage: Stage,
    pub mixture: Option<SampleBuffer>,
}

impl MixtureCandidate {
    pub fn new(target_duration: f64) -> MixtureCandidate {
        MixtureCandidate {
            base_stem_id: None,
            base_tempo: None,
            stems: Vec::new(),
            target_duration,
            stage: Stage::Selecting,
            mixture: None,
        }
    }
}

/// Why an attempt ended, and in which stage.
#[derive(Debug)]
pub struct Rejection {
    pub stage: Stage,
    pub error: AttemptError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedMixture {
    pub mixture_id: Uuid,
    pub directory: PathBuf,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub accepted: Vec<AcceptedMixture>,
    pub attempts: usize,
    /// Rejected attempts keyed by the stage they failed in.
    pub rejections: BTreeMap<Stage, usize>,
    /// Failures attributed to a single stem.
    pub stem_failures: BTreeMap<String, usize>,
}

impl SessionReport {
    fn record(&mut self, rejection: &Rejection) {
        *self.rejections.entry(rejection.stage).or_insert(0) += 1;
        if let Some(id) = rejection.error.stem_id() {
            *self.stem_failures.entry(id.to_string()).or_insert(0) += 1;
        }
    }

    pub fn rejected(&self) -> usize {
        self.rejections.values().sum()
    }

    /// Stems that failed repeatedly, most frequent first.
    pub fn repeat_offenders(&self) -> Vec<(&str, usize)> {
        let mut offenders: Vec<(&str, usize)> = self
            .stem_failures
            .iter()
            .filter(|(_, &count)| count >= REPEAT_OFFENDER)
            .map(|(id, &count)| (id.as_str(), count))
            .collect();
        offenders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        offenders
    }

    fn log_summary(&self, requested: usize) {
        info!(
            accepted = self.accepted.len(),
            requested,
            attempts = self.attempts,
            rejected = self.rejected(),
            "session finished"
        );
        for (stage, count) in &self.rejections {
            info!(?stage, count, "rejections");
        }
        for (stem, count) in self.repeat_offenders() {
            warn!(stem, count, "stem failed repeatedly");
        }
    }
}

pub struct MixtureSession<'a> {
    catalog: &'a StemCatalog,
    config: MixConfig,
    source: Box<dyn StemSource>,
    stretcher: Box<dyn TimeStretch>,
    tracker: Box<dyn BeatTracker>,
    writer: MixtureWriter,
}

impl<'a> MixtureSession<'a> {
    /// Session reading wav stems and using the built-in stretcher and beat tracker.
    pub fn new(catalog: &'a StemCatalog, config: MixConfig, writer: MixtureWriter) -> MixtureSession<'a> {
        let stretcher = SignalsmithStretcher::new(config.sample_rate);
        MixtureSession {
            catalog,
            config,
            source: Box::new(WavSource),
            stretcher: Box::new(stretcher),
            tracker: Box::new(OnsetTracker::default()),
            writer,
        }
    }

    pub fn with_source(mut self, source: impl StemSource + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    pub fn with_stretcher(mut self, stretcher: impl TimeStretch + 'static) -> Self {
        self.stretcher = Box::new(stretcher);
        self
    }

    pub fn with_tracker(mut self, tracker: impl BeatTracker + 'static) -> Self {
        self.tracker = Box::new(tracker);
        self
    }

    pub fn config(&self) -> &MixConfig {
        &self.config
    }

    /// Run one attempt to completion.
    pub fn attempt<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Mixture, Rejection> {
        let mut candidate = MixtureCandidate::new(self.config.duration);
        match self.advance(&mut candidate, rng) {
            Ok(()) => {
                candidate.stage = Stage::Accepted;
                Ok(self.accept(candidate))
            }
            Err(error) => {
                let stage = candidate.stage;
                candidate.stage = Stage::Rejected;
                Err(Rejection { stage, error })
            }
        }
    }

    fn advance<R: Rng + ?Sized>(&self, candidate: &mut MixtureCandidate, rng: &mut R) -> Result<(), AttemptError> {
        let config = &self.config;

        candidate.stage = Stage::Selecting;
        let selection = select::select(
            self.catalog,
            config.n_harmonic,
            config.n_percussive,
            config.base_stem.as_deref(),
            rng,
        )?;
        candidate.base_stem_id = Some(selection.base().stem_id.clone());
        candidate.base_tempo = Some(selection.base_tempo);

        candidate.stage = Stage::Normalizing;
        candidate.stems = tempo::normalize(
            &selection.stems,
            selection.base_tempo,
            config.sample_rate,
            self.source.as_ref(),
            self.stretcher.as_ref(),
        )?;

        candidate.stage = Stage::Aligning;
        let stems = std::mem::take(&mut candidate.stems);
        candidate.stems = align::align(stems, self.tracker.as_ref(), config.sample_rate)?;

        candidate.stage = Stage::Assembling;
        let mixture = mix::assemble(&mut candidate.stems, config.target_samples(), config.fit)?;
        candidate.mixture = Some(mixture);
        Ok(())
    }

    fn accept(&self, candidate: MixtureCandidate) -> Mixture {
        Mixture {
            mixture_id: Uuid::new_v4(),
            samples: candidate.mixture.unwrap_or_default(),
            sample_rate: self.config.sample_rate,
            duration: candidate.target_duration,
            base_stem_id: candidate.base_stem_id.unwrap_or_default(),
            base_tempo: candidate.base_tempo.unwrap_or_default(),
            stems: candidate.stems.into_iter().map(Into::into).collect(),
        }
    }

    /// A fixed base stem must be usable, or every attempt would fail the same way.
    fn check_base_stem(&self) -> Result<(), SessionError> {
        let Some(id) = self.config.base_stem.as_deref() else {
            return Ok(());
        };
        match self.catalog.get(id) {
            None => Err(SessionError::Config(format!("base stem '{}' is not in the catalog", id))),
            Some(record) if !record.is_eligible() => Err(SessionError::Config(format!(
                "base stem '{}' has no tempo bin or sound class",
                id
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Produce `n_mixtures` mixtures, persisting each as it is accepted.
    ///
    /// Attempts run in rounds of at most the number of mixtures still missing,
    /// so no accepted mixture is ever thrown away. With a seed, attempt `k`
    /// draws from its own stream seeded with `seed + k` and the run is
    /// reproducible regardless of thread count.
    pub fn run(&self) -> Result<SessionReport, SessionError> {
        self.config.validate()?;
        self.check_base_stem()?;
        let requested = self.config.n_mixtures;
        let seed = self.config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut report = SessionReport::default();

        info!(
            requested,
            stems = self.config.n_stems(),
            eligible = self.catalog.eligible_count(),
            budget = self.config.max_attempts,
            "starting session"
        );

        while report.accepted.len() < requested {
            let budget_left = self.config.max_attempts.saturating_sub(report.attempts);
            if budget_left == 0 {
                report.log_summary(requested);
                return Err(SessionError::ExhaustedRetries {
                    accepted: report.accepted.len(),
                    requested,
                    attempts: report.attempts,
                });
            }

            let round = (requested - report.accepted.len()).min(budget_left);
            let first = report.attempts;
            let outcomes: Vec<Result<Mixture, Rejection>> = (first..first + round)
                .into_par_iter()
                .map(|k| {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(k as u64));
                    self.attempt(&mut rng)
                })
                .collect();
            report.attempts += round;

            for outcome in outcomes {
                match outcome {
                    Ok(mixture) => {
                        let directory = self.writer.persist(&mixture, &self.config)?;
                        info!(
                            mixture = %mixture.mixture_id,
                            base = %mixture.base_stem_id,
                            base_tempo = mixture.base_tempo,
                            "mixture accepted"
                        );
                        report.accepted.push(AcceptedMixture {
                            mixture_id: mixture.mixture_id,
                            directory,
                        });
                    }
                    Err(rejection) => {
                        warn!(stage = ?rejection.stage, error = %rejection.error, "attempt rejected");
                        report.record(&rejection);
                    }
                }
            }
            debug!(accepted = report.accepted.len(), attempts = report.attempts, "round complete");
        }

        report.log_summary(requested);
        Ok(report)
    }
}
