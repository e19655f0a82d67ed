//! Tempo change without pitch change.
//!
//! The default stretcher runs each stem through `signalsmith-stretch` in one
//! offline pass: the whole input is processed into an output buffer of the
//! target length, the tail is flushed, and the stretcher's latency is trimmed
//! from the front so onsets stay where the new tempo puts them.

use signalsmith_stretch::Stretch;

use crate::error::StretchError;
use crate::types::SampleBuffer;

/// Stems are decoded to mono.
const CHANNELS: u32 = 1;

/// Stretch oracle. `rate > 1.0` speeds the audio up; the output holds
/// `round(len / rate)` samples.
pub trait TimeStretch: Send + Sync {
    fn stretch(&self, samples: &[f32], rate: f64) -> Result<SampleBuffer, StretchError>;
}

pub fn output_len(input_len: usize, rate: f64) -> usize {
    (input_len as f64 / rate).round() as usize
}

/// Offline wrapper around the signalsmith stretcher. A fresh `Stretch` is
/// built per call, so one instance can serve every attempt concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalsmithStretcher {
    sample_rate: u32,
}

impl SignalsmithStretcher {
    pub fn new(sample_rate: u32) -> SignalsmithStretcher {
        SignalsmithStretcher { sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Default for SignalsmithStretcher {
    fn default() -> Self {
        SignalsmithStretcher::new(crate::config::DEFAULT_SAMPLE_RATE)
    }
}

impl TimeStretch for SignalsmithStretcher {
    fn stretch(&self, samples: &[f32], rate: f64) -> Result<SampleBuffer, StretchError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(StretchError::InvalidRate(rate));
        }
        if samples.is_empty() {
            return Err(StretchError::EmptyInput);
        }
        if rate == 1.0 {
            return Ok(samples.to_vec());
        }

        let out_len = output_len(samples.len(), rate);
        if out_len == 0 {
            return Ok(Vec::new());
        }

        let mut stretcher = Stretch::preset_default(CHANNELS, self.sample_rate);
        // input latency is counted in input samples
        let delay = stretcher.output_latency() + (stretcher.input_latency() as f64 / rate).round() as usize;

        let mut output = vec![0.0f32; out_len + delay];
        {
            let (body, tail) = output.split_at_mut(out_len);
            stretcher.process(samples, body);
            stretcher.flush(tail);
        }
        output.drain(..delay);
        Ok(output)
    }
}
