//! First-beat alignment.
//!
//! The stem whose first beat comes latest is the anchor. Every other stem is
//! delayed with leading silence until its first beat lands on the same sample,
//! so no audio is ever trimmed here.

use tracing::debug;

use crate::beats::BeatTracker;
use crate::error::AttemptError;
use crate::render;
use crate::types::SelectedStem;

/// Samples of silence that move a beat at `offset` onto one at `latest`.
pub fn padding_samples(latest: f64, offset: f64, sample_rate: u32) -> usize {
    ((latest - offset) * sample_rate as f64).round_ties_even().max(0.0) as usize
}

/// Populate `first_beat_offset`, `padding` and `aligned_audio` for every stem.
pub fn align(
    mut stems: Vec<SelectedStem>,
    tracker: &dyn BeatTracker,
    sample_rate: u32,
) -> Result<Vec<SelectedStem>, AttemptError> {
    for stem in stems.iter_mut() {
        let beats = tracker.beats(&stem.stretched_audio, sample_rate);
        stem.first_beat_offset = *beats.first().ok_or_else(|| AttemptError::NoBeatDetected {
            stem_id: stem.stem_id().to_string(),
        })?;
    }

    let latest = stems
        .iter()
        .map(|s| s.first_beat_offset)
        .fold(f64::NEG_INFINITY, f64::max);

    for stem in stems.iter_mut() {
        stem.padding = padding_samples(latest, stem.first_beat_offset, sample_rate);
        stem.aligned_audio = render::pad_front(&stem.stretched_audio, stem.padding);
        debug!(
            stem = %stem.stem_id(),
            first_beat = stem.first_beat_offset,
            padding = stem.padding,
            "aligned"
        );
    }
    Ok(stems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SoundClass, StemRecord, TempoBin};
    use std::path::PathBuf;

    const SR: u32 = 22050;

    fn stem(id: &str, audio: Vec<f32>) -> SelectedStem {
        let mut stem = SelectedStem::new(StemRecord {
            stem_id: id.to_string(),
            data_home: PathBuf::from("/stems"),
            tempo: Some(100.0),
            tempo_bin: Some(TempoBin::from(100)),
            instrument_name: None,
            sound_class: SoundClass::Percussive,
            key: None,
        });
        stem.stretched_audio = audio;
        stem
    }

    #[test]
    fn test_earlier_beat_is_padded_to_later_one() {
        // beat positions keyed by buffer length
        let tracker = |samples: &[f32], _: u32| {
            if samples.len() == 1000 {
                vec![0.10, 0.6]
            } else {
                vec![0.35]
            }
        };
        let stems = vec![stem("early", vec![0.5; 1000]), stem("late", vec![0.5; 2000])];

        let aligned = align(stems, &tracker, SR).unwrap();
        assert_eq!(aligned[0].first_beat_offset, 0.10);
        assert_eq!(aligned[0].padding, 5512);
        assert_eq!(aligned[0].aligned_audio.len(), 1000 + 5512);
        assert!(aligned[0].aligned_audio[..5512].iter().all(|&s| s == 0.0));
        assert_eq!(aligned[1].padding, 0);
        assert_eq!(aligned[1].aligned_audio, vec![0.5; 2000]);
    }

    #[test]
    fn test_no_beat_aborts_with_stem_id() {
        let tracker = |samples: &[f32], _: u32| {
            if samples.len() == 10 {
                Vec::new()
            } else {
                vec![0.2]
            }
        };
        let stems = vec![stem("fine", vec![0.5; 100]), stem("atonal", vec![0.5; 10])];
        let err = align(stems, &tracker, SR).unwrap_err();
        assert!(matches!(err, AttemptError::NoBeatDetected { stem_id } if stem_id == "atonal"));
    }

    #[test]
    fn test_padding_rounds_to_nearest_sample() {
        assert_eq!(padding_samples(0.35, 0.10, SR), 5512);
        assert_eq!(padding_samples(1.0, 0.5, 44100), 22050);
        assert_eq!(padding_samples(0.5, 0.5, 44100), 0);
        assert_eq!(padding_samples(0.25, 0.0, 22050), 5512);
    }
}
