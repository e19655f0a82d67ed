use std::path::Path;

use crate::error::AudioError;
use crate::types::SampleBuffer;

pub fn peak(buffer: &[f32]) -> f32 {
    buffer.iter().map(|&sample| sample.abs()).fold(0.0, f32::max)
}

/// Scale so the loudest sample sits at 1.0. Silent buffers are left alone.
pub fn normalize(buffer: &mut SampleBuffer) {
    if buffer.is_empty() {
        return;
    }

    let max_amplitude = peak(buffer);

    if max_amplitude != 0.0 {
        buffer.iter_mut().for_each(|sample| *sample /= max_amplitude);
    }
}

pub fn is_silent(buffer: &[f32]) -> bool {
    buffer.iter().all(|&sample| sample == 0.0)
}

/// Prepend `n` samples of silence.
pub fn pad_front(buffer: &[f32], n: usize) -> SampleBuffer {
    let mut padded = vec![0.0; n + buffer.len()];
    padded[n..].copy_from_slice(buffer);
    padded
}

/// Sample-wise sum of equal-length buffers. No rescaling is applied to the result.
pub fn sum_buffers(buffers: &[SampleBuffer], length: usize) -> SampleBuffer {
    let mut mixed_buffer = vec![0.0; length];

    for buffer in buffers {
        for (out, &sample) in mixed_buffer.iter_mut().zip(buffer.iter()) {
            *out += sample;
        }
    }

    mixed_buffer
}

/// Write a mono 32-bit float wav.
pub fn samples_f32(sample_rate: u32, samples: &[f32], filename: &Path) -> Result<(), AudioError> {
    let wav_err = |source: hound::Error| AudioError::Wav {
        path: filename.to_path_buf(),
        source,
    };
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(filename, spec).map_err(wav_err)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)
}
