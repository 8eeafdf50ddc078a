//! Complex sample frames.
//!
//! The data inspector produces signed 16-bit fixed-point values with
//! [`FRACTIONAL_BITS`] fractional bits, interleaving the real and imaginary
//! parts of each sample. This module converts them into complex
//! floating-point frames.

use bytes::Bytes;
use num_complex::Complex;

/// Number of fractional bits of the data inspector fixed-point samples.
pub const FRACTIONAL_BITS: u32 = 14;

/// Largest number of fractional bits of a signed 16-bit fixed-point value.
pub const MAX_FRACTIONAL_BITS: u32 = 15;

/// Frame of complex samples produced by one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Capture sequence number, counted by the driver instance.
    pub sequence: u64,
    /// Complex samples.
    pub samples: Vec<Complex<f64>>,
}

impl Frame {
    /// Number of complex samples in the frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the frame has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Serializes the samples as interleaved native-endian `f32` real and
    /// imaginary parts.
    pub fn to_f32_bytes(&self) -> Bytes {
        self.samples
            .iter()
            .flat_map(|x| [x.re as f32, x.im as f32])
            .flat_map(|x| x.to_ne_bytes().into_iter())
            .collect()
    }

    /// Converts the frame into its JSON representation.
    pub fn to_json(&self, sampling_frequency: f64) -> inspector_json::Frame {
        inspector_json::Frame {
            sequence: self.sequence,
            sampling_frequency,
            re: self.samples.iter().map(|x| x.re).collect(),
            im: self.samples.iter().map(|x| x.im).collect(),
        }
    }
}

/// Converts interleaved fixed-point values into complex samples.
///
/// Each value is scaled by `2^-fractional_bits`, and consecutive values are
/// taken as the real and imaginary parts of a sample. A trailing unpaired
/// value is ignored.
pub fn decode(raw: &[i16], fractional_bits: u32) -> Vec<Complex<f64>> {
    let scale = 2f64.powi(-(fractional_bits as i32));
    raw.chunks_exact(2)
        .map(|iq| Complex::new(f64::from(iq[0]) * scale, f64::from(iq[1]) * scale))
        .collect()
}

/// Normalizes the samples to the magnitude of the maximum sample.
///
/// The maximum is taken in lexicographic order (largest real part, ties
/// broken by the imaginary part), not by magnitude. A sample with a large
/// negative real part is therefore not the reference and can end with a
/// magnitude above one. If the reference sample is zero the samples are left
/// unchanged.
pub fn autoscale(samples: &mut [Complex<f64>]) {
    let Some(max) = lexicographic_max(samples) else {
        return;
    };
    let magnitude = max.norm();
    if magnitude == 0.0 {
        return;
    }
    let scale = magnitude.recip();
    for x in samples.iter_mut() {
        *x *= scale;
    }
}

fn lexicographic_max(samples: &[Complex<f64>]) -> Option<Complex<f64>> {
    samples
        .iter()
        .copied()
        .reduce(|max, x| if (x.re, x.im) > (max.re, max.im) { x } else { max })
}
