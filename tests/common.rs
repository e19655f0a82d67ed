#![allow(dead_code)]
use std::path::Path;

use stem_mixer::config::{FitPolicy, MixConfig};
use stem_mixer::index::{self, IndexConfig, StemMetadata};
use stem_mixer::render;
use stem_mixer::types::{SoundClass, StemRecord, TempoBin};

pub const TEST_SAMPLE_RATE: u32 = 22050;

pub fn record(id: &str, class: SoundClass, tempo: f64, instrument: &str) -> StemRecord {
    StemRecord {
        stem_id: id.to_string(),
        data_home: "/stems".into(),
        tempo: Some(tempo),
        tempo_bin: Some(TempoBin::from_bpm(tempo.round())),
        instrument_name: Some(instrument.to_string()),
        sound_class: class,
        key: None,
    }
}

/// Decaying 1 kHz bursts, each starting exactly at one of `onsets`.
pub fn click_track(onsets: &[usize], len: usize) -> Vec<f32> {
    let mut signal = vec![0.0; len];
    for &start in onsets {
        for i in 0..400 {
            if start + i < len {
                let t = i as f32 / TEST_SAMPLE_RATE as f32;
                signal[start + i] += (-t * 400.0).exp() * (std::f32::consts::TAU * 1000.0 * t + 1.5708).sin();
            }
        }
    }
    signal
}

/// Clicks every `period` samples from `first` on.
pub fn pulse(first: usize, period: usize, len: usize) -> Vec<f32> {
    let onsets: Vec<usize> = (first..len).step_by(period).collect();
    click_track(&onsets, len)
}

pub struct StemSpec<'a> {
    pub name: &'a str,
    pub class: &'a str,
    pub tempo: f64,
    pub instrument: &'a str,
    pub first_click: usize,
}

/// Writes each stem as a wav with a json sidecar, then indexes the directory.
pub fn write_stems(home: &Path, stems: &[StemSpec]) {
    for stem in stems {
        let wav = home.join(stem.name);
        let audio = pulse(stem.first_click, 6615, 2 * TEST_SAMPLE_RATE as usize);
        render::samples_f32(TEST_SAMPLE_RATE, &audio, &wav).unwrap();

        let metadata = StemMetadata {
            tempo: Some(stem.tempo),
            instrument_name: Some(stem.instrument.to_string()),
            key: None,
            sound_class: Some(stem.class.to_string()),
        };
        let sidecar = std::fs::File::create(wav.with_extension("json")).unwrap();
        serde_json::to_writer(sidecar, &metadata).unwrap();
    }
    index::build(&IndexConfig::new(home)).unwrap();
}

pub fn test_config(n_mixtures: usize, n_harmonic: usize, n_percussive: usize) -> MixConfig {
    let mut config = MixConfig::from_counts(n_mixtures, n_harmonic + n_percussive, n_harmonic, n_percussive);
    config.sample_rate = TEST_SAMPLE_RATE;
    config.duration = 1.0;
    config.fit = FitPolicy::Pad;
    config.seed = Some(42);
    config
}
