//! Sample-rate conversion via rubato
//!
//! Band-limited FFT resampling of 16-bit mono PCM. The converter is a pure
//! function of its input buffer: the resampler's startup delay is flushed and
//! trimmed so the output covers exactly the input's duration,
//! `round(len * to_rate / from_rate)` samples.

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

/// Fixed input chunk size fed to the resampler
const CHUNK_SIZE: usize = 1024;

/// Number of FFT sub-chunks per input chunk
const SUB_CHUNKS: usize = 2;

/// Resample 16-bit mono PCM between two rates.
///
/// Output length is `round(len * to_rate / from_rate)`; samples are clipped
/// back to the i16 range since band-limited resampling can overshoot.
///
/// # Errors
///
/// Returns `Error::Resample` for a zero rate or a resampler failure.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Result<Vec<i16>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Resample(format!(
            "invalid rate pair: {from_rate} -> {to_rate}"
        )));
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round()
        as usize;

    let mut resampler = FftFixedIn::<f64>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1,
    )
    .map_err(|e| Error::Resample(format!("resampler init failed: {e}")))?;

    let delay = resampler.output_delay();
    let mut produced: Vec<f64> = Vec::with_capacity(expected + delay + CHUNK_SIZE);

    let mut chunk = vec![0.0f64; CHUNK_SIZE];
    for input in samples.chunks(CHUNK_SIZE) {
        for (dst, src) in chunk.iter_mut().zip(input) {
            *dst = f64::from(*src) / 32768.0;
        }
        // zero-pad the tail of a final partial chunk
        for dst in chunk.iter_mut().skip(input.len()) {
            *dst = 0.0;
        }

        let out = resampler
            .process(&[&chunk], None)
            .map_err(|e| Error::Resample(format!("resample failed: {e}")))?;
        produced.extend_from_slice(&out[0]);
    }

    // Feed silence until the delay line has flushed the real tail
    let silence = vec![0.0f64; CHUNK_SIZE];
    while produced.len() < delay + expected {
        let out = resampler
            .process(&[&silence], None)
            .map_err(|e| Error::Resample(format!("resample flush failed: {e}")))?;
        if out[0].is_empty() {
            break;
        }
        produced.extend_from_slice(&out[0]);
    }

    Ok(produced
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, rate: u32, len: usize, amplitude: f32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / rate as f32;
                (amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn test_length_law_upsample() {
        // one 40ms device frame up to the cloud rate
        let out = resample(&vec![0i16; 640], 16_000, 24_000).unwrap();
        assert_eq!(out.len(), 960);
    }

    #[test]
    fn test_length_law_downsample() {
        let out = resample(&vec![0i16; 960], 24_000, 16_000).unwrap();
        assert_eq!(out.len(), 640);
    }

    #[test]
    fn test_length_law_arbitrary_sizes() {
        for len in [1usize, 7, 100, 641, 1024, 1025, 4801] {
            let up = resample(&vec![0i16; len], 16_000, 24_000).unwrap();
            let expect = (len as f64 * 24_000.0 / 16_000.0).round() as usize;
            assert_eq!(up.len(), expect, "upsample of {len} samples");

            let down = resample(&vec![0i16; len], 24_000, 16_000).unwrap();
            let expect = (len as f64 * 16_000.0 / 24_000.0).round() as usize;
            assert_eq!(down.len(), expect, "downsample of {len} samples");
        }
    }

    #[test]
    fn test_same_rate_passthrough() {
        let input = sine(440.0, 16_000, 1600, 10_000.0);
        assert_eq!(resample(&input, 16_000, 16_000).unwrap(), input);
    }

    #[test]
    fn test_empty_input() {
        assert!(resample(&[], 16_000, 24_000).unwrap().is_empty());
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(resample(&[0i16; 10], 0, 24_000).is_err());
        assert!(resample(&[0i16; 10], 16_000, 0).is_err());
    }

    #[test]
    fn test_tone_amplitude_preserved() {
        // a mid-band tone should come through at roughly its input level
        let input = sine(440.0, 16_000, 16_000, 10_000.0);
        let out = resample(&input, 16_000, 24_000).unwrap();

        let peak = out.iter().map(|s| i32::from(*s).abs()).max().unwrap();
        assert!(peak > 7_000, "peak {peak} too quiet");
        assert!(peak < 13_000, "peak {peak} too loud");
    }

    #[test]
    fn test_output_stays_in_range() {
        // full-scale square wave rings hard at the edges; clipping must hold
        let input: Vec<i16> = (0..4800)
            .map(|i| if (i / 20) % 2 == 0 { i16::MAX } else { i16::MIN })
            .collect();
        let out = resample(&input, 24_000, 16_000).unwrap();
        assert_eq!(out.len(), 3200);
        // i16 arithmetic can't leave the range; the check is that we got here
        // without a panic from the float conversion
        assert!(out.iter().any(|s| s.abs() > 10_000));
    }
}
