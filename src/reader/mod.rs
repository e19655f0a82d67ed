//! Decoding stems to mono buffers at the session sample rate.

use hound::SampleFormat;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use std::path::Path;

use crate::error::AudioError;
use crate::types::{SampleBuffer, StemRecord};

const RESAMPLE_CHUNK: usize = 1024;

/// Where stem audio comes from. The session only ever asks for a decoded,
/// mono buffer at its own sample rate.
pub trait StemSource: Send + Sync {
    fn load(&self, record: &StemRecord, sample_rate: u32) -> Result<SampleBuffer, AudioError>;
}

/// Reads `data_home/stem_name` as a wav file.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavSource;

impl StemSource for WavSource {
    fn load(&self, record: &StemRecord, sample_rate: u32) -> Result<SampleBuffer, AudioError> {
        samples(&record.audio_path(), sample_rate)
    }
}

/// Decode a wav file, downmix to mono and resample to `sample_rate`.
pub fn samples(path: &Path, sample_rate: u32) -> Result<SampleBuffer, AudioError> {
    let (mono, file_rate) = read_mono(path)?;
    if mono.is_empty() {
        return Err(AudioError::Empty(path.to_path_buf()));
    }
    if file_rate == sample_rate {
        return Ok(mono);
    }
    resample(&mono, file_rate, sample_rate)
}

/// Raw decode: interleaved frames are averaged down to one channel.
pub fn read_mono(path: &Path) -> Result<(SampleBuffer, u32), AudioError> {
    let wav_err = |source: hound::Error| AudioError::Wav {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = hound::WavReader::open(path).map_err(wav_err)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(wav_err)?,
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(wav_err)?
        }
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat {
                path: path.to_path_buf(),
                bits,
                format,
            })
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok((mono, spec.sample_rate))
}

/// Band-limited sinc resampling of a mono buffer. The output is trimmed of
/// the filter delay so sample `i` of the input lands at `i * to / from`.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<SampleBuffer, AudioError> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let ratio = to as f64 / from as f64;
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut resampled: SampleBuffer = Vec::with_capacity(expected + delay);

    for chunk in samples.chunks(RESAMPLE_CHUNK) {
        let input = [chunk];
        let processed = if chunk.len() == RESAMPLE_CHUNK {
            resampler.process(&input[..], None)?
        } else {
            resampler.process_partial(Some(&input[..]), None)?
        };
        resampled.extend_from_slice(&processed[0]);
    }

    // flush the filter tail
    while resampled.len() < expected + delay {
        let processed = resampler.process_partial(None::<&[&[f32]]>, None)?;
        if processed[0].is_empty() {
            break;
        }
        resampled.extend_from_slice(&processed[0]);
    }

    resampled.drain(..delay.min(resampled.len()));
    resampled.resize(expected, 0.0);
    Ok(resampled)
}
