//! PCM handling
//!
//! Byte/sample conversions and sample-rate conversion for 16-bit signed
//! mono PCM, the only audio format the bridge moves.

mod resample;

pub use resample::resample;

use crate::{Error, Result};

/// Reinterpret little-endian PCM bytes as i16 samples.
///
/// # Errors
///
/// Returns `Error::Resample` if the buffer length is odd; a torn sample
/// means the chunk is corrupt and must be discarded.
pub fn pcm_to_samples(pcm: &[u8]) -> Result<Vec<i16>> {
    if pcm.len() % 2 != 0 {
        return Err(Error::Resample(format!(
            "odd PCM buffer length: {}",
            pcm.len()
        )));
    }

    Ok(pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

/// Serialize i16 samples as little-endian PCM bytes
#[must_use]
pub fn samples_to_pcm(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Mean absolute amplitude of a PCM byte buffer.
///
/// Ignores a trailing torn byte rather than failing; amplitude is advisory.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_abs_amplitude(pcm: &[u8]) -> f32 {
    let samples = pcm.len() / 2;
    if samples == 0 {
        return 0.0;
    }

    let sum: f64 = pcm
        .chunks_exact(2)
        .map(|b| f64::from(i16::from_le_bytes([b[0], b[1]])).abs())
        .sum();
    (sum / samples as f64) as f32
}
