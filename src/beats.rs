//! Beat onset estimation.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::render;

/// Beat oracle: ordered onset times in seconds from the start of `samples`.
/// An empty result means no beat was found.
pub trait BeatTracker: Send + Sync {
    fn beats(&self, samples: &[f32], sample_rate: u32) -> Vec<f64>;
}

impl<F> BeatTracker for F
where
    F: Fn(&[f32], u32) -> Vec<f64> + Send + Sync,
{
    fn beats(&self, samples: &[f32], sample_rate: u32) -> Vec<f64> {
        self(samples, sample_rate)
    }
}

/// Spectral-flux onset detector.
///
/// Peaks of the half-wave rectified magnitude difference between successive
/// STFT frames are picked against a threshold relative to the strongest peak.
/// Each peak is then refined in the time domain to the first sample reaching
/// half of the local maximum, so a shifted signal yields exactly shifted onsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetTracker {
    pub frame: usize,
    pub hop: usize,
    /// Fraction of the strongest flux peak an onset must reach.
    pub sensitivity: f32,
    /// Minimum spacing between onsets, in seconds.
    pub min_gap: f64,
    /// Signals whose peak stays below this are treated as silence.
    pub silence: f32,
}

impl Default for OnsetTracker {
    fn default() -> Self {
        OnsetTracker {
            frame: 1024,
            hop: 512,
            sensitivity: 0.2,
            min_gap: 0.1,
            silence: 1e-4,
        }
    }
}

impl OnsetTracker {
    fn flux(&self, samples: &[f32]) -> Vec<f32> {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.frame);
        let n = self.frame as f32;
        let window: Vec<f32> = (0..self.frame)
            .map(|i| 0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / n).cos())
            .collect();

        let bins = self.frame / 2 + 1;
        let mut previous = vec![0.0f32; bins];
        let mut spectrum = vec![Complex::new(0.0f32, 0.0); self.frame];
        let mut flux = Vec::with_capacity(samples.len() / self.hop + 1);

        let mut start = 0;
        while start < samples.len() {
            for (i, bin) in spectrum.iter_mut().enumerate() {
                let s = samples.get(start + i).copied().unwrap_or(0.0);
                *bin = Complex::new(s * window[i], 0.0);
            }
            fft.process(&mut spectrum);

            let mut rise = 0.0;
            for (k, prev) in previous.iter_mut().enumerate() {
                let magnitude = spectrum[k].norm();
                rise += (magnitude - *prev).max(0.0);
                *prev = magnitude;
            }
            flux.push(rise);
            start += self.hop;
        }
        flux
    }

    fn pick_peaks(&self, flux: &[f32]) -> Vec<usize> {
        let strongest = flux.iter().copied().fold(0.0, f32::max);
        if strongest <= 0.0 {
            return Vec::new();
        }
        let threshold = strongest * self.sensitivity;

        (0..flux.len())
            .filter(|&t| {
                let before = if t == 0 { 0.0 } else { flux[t - 1] };
                let after = flux.get(t + 1).copied().unwrap_or(0.0);
                flux[t] >= threshold && flux[t] >= before && flux[t] > after
            })
            .collect()
    }

    /// First sample in `[from, to)` reaching half the region's peak.
    fn refine(samples: &[f32], from: usize, to: usize) -> Option<usize> {
        let to = to.min(samples.len());
        if from >= to {
            return None;
        }
        let region = &samples[from..to];
        let local_peak = render::peak(region);
        if local_peak <= 0.0 {
            return None;
        }
        region
            .iter()
            .position(|s| s.abs() >= 0.5 * local_peak)
            .map(|i| from + i)
    }
}

impl BeatTracker for OnsetTracker {
    fn beats(&self, samples: &[f32], sample_rate: u32) -> Vec<f64> {
        if samples.is_empty() || render::peak(samples) < self.silence {
            return Vec::new();
        }

        let flux = self.flux(samples);
        let gap = (self.min_gap * sample_rate as f64).round() as usize;
        let mut onsets: Vec<usize> = Vec::new();

        for t in self.pick_peaks(&flux) {
            let frame_start = t * self.hop;
            let mut from = frame_start.saturating_sub(self.frame);
            if let Some(&last) = onsets.last() {
                from = from.max(last + gap);
            }
            let Some(onset) = OnsetTracker::refine(samples, from, frame_start + self.frame) else {
                continue;
            };
            if onsets.last().map_or(true, |&last| onset >= last + gap) {
                onsets.push(onset);
            }
        }

        onsets
            .into_iter()
            .map(|idx| idx as f64 / sample_rate as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 22050;

    /// Decaying 1 kHz bursts starting exactly at the given sample indices.
    fn clicks(onsets: &[usize], len: usize) -> Vec<f32> {
        let mut signal = vec![0.0; len];
        for &start in onsets {
            for i in 0..400 {
                if start + i < len {
                    let t = i as f32 / SR as f32;
                    signal[start + i] += (-t * 400.0).exp() * (std::f32::consts::TAU * 1000.0 * t + 1.5708).sin();
                }
            }
        }
        signal
    }

    #[test]
    fn test_detects_click_onsets_exactly() {
        let onsets = [3000, 14025, 25050];
        let signal = clicks(&onsets, 33075);
        let beats = OnsetTracker::default().beats(&signal, SR);

        let expected: Vec<f64> = onsets.iter().map(|&s| s as f64 / SR as f64).collect();
        assert_eq!(beats, expected);
    }

    #[test]
    fn test_shifted_signal_shifts_onsets() {
        let tracker = OnsetTracker::default();
        let signal = clicks(&[2205, 13230], 22050);
        let first = tracker.beats(&signal, SR)[0];

        for shift in [1usize, 37, 511, 1300] {
            let shifted = render::pad_front(&signal, shift);
            let moved = tracker.beats(&shifted, SR)[0];
            let delta = ((moved - first) * SR as f64).round() as usize;
            assert_eq!(delta, shift);
        }
    }

    #[test]
    fn test_silence_has_no_beats() {
        let tracker = OnsetTracker::default();
        assert!(tracker.beats(&vec![0.0; 22050], SR).is_empty());
        assert!(tracker.beats(&[], SR).is_empty());
    }

    #[test]
    fn test_closure_tracker() {
        let fixed = |_: &[f32], _: u32| vec![0.25, 0.75];
        assert_eq!(fixed.beats(&[0.0; 4], SR), vec![0.25, 0.75]);
    }
}
