use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

pub type SampleBuffer = Vec<f32>;

/// Coarse tag deciding which pool a stem is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundClass {
    Harmonic,
    Percussive,
    Vocals,
    Unknown,
}

impl SoundClass {
    /// Lenient parse used for index cells and sidecar metadata.
    /// Anything unrecognised (including empty cells) is `Unknown`.
    pub fn parse(label: &str) -> SoundClass {
        match label.trim().to_ascii_lowercase().as_str() {
            "harmonic" => SoundClass::Harmonic,
            "percussive" => SoundClass::Percussive,
            "vocals" => SoundClass::Vocals,
            _ => SoundClass::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SoundClass::Harmonic => "harmonic",
            SoundClass::Percussive => "percussive",
            SoundClass::Vocals => "vocals",
            SoundClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SoundClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque compatibility key: two stems fit together iff their bins are equal.
///
/// Numeric bins are normalised so `100`, `100.0` and ` 100 ` are the same key,
/// while `97.5` and `98` stay apart. Anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempoBin(String);

impl TempoBin {
    /// `None` for empty cells and `NaN`, which pandas writes for missing bins.
    pub fn parse(raw: &str) -> Option<TempoBin> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_nan() => None,
            Ok(value) if value.is_finite() => Some(TempoBin::from_bpm(value)),
            _ => Some(TempoBin(raw.to_string())),
        }
    }

    pub fn from_bpm(bpm: f64) -> TempoBin {
        if bpm.fract() == 0.0 && bpm.abs() < i64::MAX as f64 {
            TempoBin((bpm as i64).to_string())
        } else {
            TempoBin(bpm.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tempo of the bin in BPM, when the key is a positive number.
    pub fn bpm(&self) -> Option<f64> {
        self.0.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
    }
}

impl From<u32> for TempoBin {
    fn from(bpm: u32) -> Self {
        TempoBin(bpm.to_string())
    }
}

impl fmt::Display for TempoBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One catalog row. Immutable once the catalog is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemRecord {
    pub stem_id: String,
    pub data_home: PathBuf,
    pub tempo: Option<f64>,
    pub tempo_bin: Option<TempoBin>,
    pub instrument_name: Option<String>,
    pub sound_class: SoundClass,
    /// Parsed but not used for selection yet.
    pub key: Option<String>,
}

impl StemRecord {
    /// Location of the stem's audio on disk.
    pub fn audio_path(&self) -> PathBuf {
        self.data_home.join(&self.stem_id)
    }

    /// Rows lacking a tempo bin or a known sound class never enter a candidate pool.
    pub fn is_eligible(&self) -> bool {
        self.tempo_bin.is_some() && self.sound_class != SoundClass::Unknown
    }

    /// Two stems clash when both name the same instrument. Absent names never clash.
    pub fn shares_instrument(&self, other: Option<&str>) -> bool {
        match (self.instrument_name.as_deref(), other) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// A catalog record carried through one mixture attempt. Every buffer is
/// owned by the attempt and dropped with it.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedStem {
    pub record: StemRecord,
    /// Decoded audio at the session sample rate.
    pub raw_audio: SampleBuffer,
    /// `base_tempo / tempo`. Above 1.0 the stem is sped up.
    pub stretch_ratio: f64,
    pub stretched_audio: SampleBuffer,
    /// Seconds from buffer start to the first detected beat.
    pub first_beat_offset: f64,
    /// Silence prepended during alignment, in samples.
    pub padding: usize,
    pub aligned_audio: SampleBuffer,
    pub final_audio: SampleBuffer,
}

impl SelectedStem {
    pub fn new(record: StemRecord) -> SelectedStem {
        SelectedStem {
            record,
            raw_audio: Vec::new(),
            stretch_ratio: 1.0,
            stretched_audio: Vec::new(),
            first_beat_offset: 0.0,
            padding: 0,
            aligned_audio: Vec::new(),
            final_audio: Vec::new(),
        }
    }

    pub fn stem_id(&self) -> &str {
        &self.record.stem_id
    }
}

/// One constituent of an accepted mixture, reduced to what is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureStem {
    pub record: StemRecord,
    pub stretch_ratio: f64,
    pub first_beat_offset: f64,
    pub padding: usize,
    pub samples: SampleBuffer,
}

impl From<SelectedStem> for MixtureStem {
    fn from(stem: SelectedStem) -> Self {
        MixtureStem {
            record: stem.record,
            stretch_ratio: stem.stretch_ratio,
            first_beat_offset: stem.first_beat_offset,
            padding: stem.padding,
            samples: stem.final_audio,
        }
    }
}

/// An accepted mixture: the summed buffer plus the fitted stems it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Mixture {
    pub mixture_id: Uuid,
    pub samples: SampleBuffer,
    pub sample_rate: u32,
    pub duration: f64,
    pub base_stem_id: String,
    pub base_tempo: f64,
    pub stems: Vec<MixtureStem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sound_class() {
        assert_eq!(SoundClass::parse("percussive"), SoundClass::Percussive);
        assert_eq!(SoundClass::parse(" Harmonic "), SoundClass::Harmonic);
        assert_eq!(SoundClass::parse("vocals"), SoundClass::Vocals);
        assert_eq!(SoundClass::parse(""), SoundClass::Unknown);
        assert_eq!(SoundClass::parse("drums"), SoundClass::Unknown);
    }

    #[test]
    fn test_absent_instruments_never_clash() {
        let record = StemRecord {
            stem_id: "a.wav".to_string(),
            data_home: PathBuf::from("/stems"),
            tempo: Some(100.0),
            tempo_bin: Some(TempoBin::from(100)),
            instrument_name: None,
            sound_class: SoundClass::Harmonic,
            key: None,
        };
        assert!(!record.shares_instrument(None));
        assert!(!record.shares_instrument(Some("bass")));
        assert_eq!(record.audio_path(), PathBuf::from("/stems/a.wav"));
    }

    #[test]
    fn test_tempo_bin_keys() {
        assert_eq!(TempoBin::parse("100"), TempoBin::parse("100.0"));
        assert_eq!(TempoBin::parse(" 100 ").unwrap().as_str(), "100");
        assert_ne!(TempoBin::parse("97.5"), TempoBin::parse("98"));
        assert_eq!(TempoBin::parse("97.5").unwrap().bpm(), Some(97.5));

        let slow = TempoBin::parse("slow").unwrap();
        assert_eq!(slow.as_str(), "slow");
        assert_eq!(slow.bpm(), None);

        assert_eq!(TempoBin::parse(""), None);
        assert_eq!(TempoBin::parse("NaN"), None);
        assert_eq!(TempoBin::from(120), TempoBin::from_bpm(120.0));
    }
}
