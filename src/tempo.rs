//! Bringing every selected stem to the base tempo.

use tracing::{debug, warn};

use crate::error::AttemptError;
use crate::reader::StemSource;
use crate::stretch::TimeStretch;
use crate::types::{SelectedStem, StemRecord};

/// Ratios outside this range stretch audibly; they are logged, not refused.
pub const COMFORTABLE_RATIO: (f64, f64) = (0.5, 2.0);

/// `base_tempo / stem_tempo`, or `MissingTempo` when the stem has no usable tempo.
pub fn stretch_ratio(record: &StemRecord, base_tempo: f64) -> Result<f64, AttemptError> {
    let missing = || AttemptError::MissingTempo {
        stem_id: record.stem_id.clone(),
    };
    let tempo = record.tempo.filter(|t| t.is_finite() && *t > 0.0).ok_or_else(missing)?;
    let ratio = base_tempo / tempo;
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(missing());
    }
    Ok(ratio)
}

/// Decode and stretch each stem. Works on fresh copies; the catalog records
/// are only read. The first failing stem abandons the whole batch.
pub fn normalize(
    stems: &[StemRecord],
    base_tempo: f64,
    sample_rate: u32,
    source: &dyn StemSource,
    stretcher: &dyn TimeStretch,
) -> Result<Vec<SelectedStem>, AttemptError> {
    // check every tempo before paying for any decode
    let ratios = stems
        .iter()
        .map(|record| stretch_ratio(record, base_tempo))
        .collect::<Result<Vec<f64>, _>>()?;

    let mut normalized = Vec::with_capacity(stems.len());
    for (record, ratio) in stems.iter().zip(ratios) {
        if ratio < COMFORTABLE_RATIO.0 || ratio > COMFORTABLE_RATIO.1 {
            warn!(stem = %record.stem_id, ratio, "large tempo change, expect artefacts");
        }

        let mut stem = SelectedStem::new(record.clone());
        stem.raw_audio = source
            .load(record, sample_rate)
            .map_err(|source| AttemptError::Decode {
                stem_id: record.stem_id.clone(),
                source,
            })?;
        stem.stretch_ratio = ratio;
        stem.stretched_audio = stretcher
            .stretch(&stem.raw_audio, ratio)
            .map_err(|source| AttemptError::Stretch {
                stem_id: record.stem_id.clone(),
                source,
            })?;

        debug!(
            stem = %record.stem_id,
            ratio,
            samples_in = stem.raw_audio.len(),
            samples_out = stem.stretched_audio.len(),
            "stretched"
        );
        normalized.push(stem);
    }
    Ok(normalized)
}
