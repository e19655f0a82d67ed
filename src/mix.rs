//! Duration fitting and summation.

use crate::config::FitPolicy;
use crate::error::AttemptError;
use crate::render;
use crate::types::{SampleBuffer, SelectedStem};

/// Bring each buffer to `target` samples under `policy`.
///
/// `Cut` first truncates every buffer to the shortest common length and then
/// keeps the last `target` samples of that window.
pub fn fit_buffers(
    buffers: &[&[f32]],
    target: usize,
    policy: FitPolicy,
) -> Result<Vec<SampleBuffer>, AttemptError> {
    match policy {
        FitPolicy::Cut => {
            let common = buffers.iter().map(|b| b.len()).min().unwrap_or(0);
            if common < target {
                return Err(AttemptError::ShortStem {
                    available: common,
                    required: target,
                });
            }
            let start = common - target;
            Ok(buffers.iter().map(|b| b[start..common].to_vec()).collect())
        }
        FitPolicy::Pad => Ok(buffers
            .iter()
            .map(|b| {
                let mut fitted = b[..b.len().min(target)].to_vec();
                fitted.resize(target, 0.0);
                fitted
            })
            .collect()),
        FitPolicy::Repeat => Ok(buffers
            .iter()
            .map(|b| {
                if b.is_empty() {
                    return Vec::new();
                }
                b.iter().copied().cycle().take(target).collect()
            })
            .collect()),
    }
}

/// Fit, validate, peak-normalise and sum the aligned stems.
///
/// Fills `final_audio` on each stem and returns the mixture buffer, which is
/// `target` samples long and peaks no higher than the stem count.
pub fn assemble(
    stems: &mut [SelectedStem],
    target: usize,
    policy: FitPolicy,
) -> Result<SampleBuffer, AttemptError> {
    let aligned: Vec<&[f32]> = stems.iter().map(|s| s.aligned_audio.as_slice()).collect();
    let fitted = fit_buffers(&aligned, target, policy)?;

    for (stem, mut buffer) in stems.iter_mut().zip(fitted) {
        if buffer.len() != target || render::is_silent(&buffer) {
            return Err(AttemptError::EmptyStem {
                stem_id: stem.stem_id().to_string(),
            });
        }
        render::normalize(&mut buffer);
        stem.final_audio = buffer;
    }

    let finals: Vec<SampleBuffer> = stems.iter().map(|s| s.final_audio.clone()).collect();
    Ok(render::sum_buffers(&finals, target))
}
