//! Post-training quantization
//!
//! Affine int8 quantization driven by observed value ranges. Graph inputs
//! get their ranges from calibration samples; weight tensors from their own
//! data. Range observation is the only stage that touches user-supplied
//! data, so it polls the cancellation token between samples.

use rustc_hash::FxHashMap;

use crate::cancel::CancelToken;
use crate::error::{ConvertError, ConvertResult};

/// One calibration sample: flattened values per graph input name
pub type CalibrationSample = FxHashMap<String, Vec<f32>>;

/// Provider of representative input data
///
/// `samples` must yield a fresh pass each time it is called; observation may
/// restart the set after a transient failure.
pub trait CalibrationSource {
    /// Iterate over the calibration set from the beginning
    fn samples(&self) -> Box<dyn Iterator<Item = ConvertResult<CalibrationSample>> + '_>;
}

/// Calibration set held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCalibration {
    samples: Vec<CalibrationSample>,
}

impl InMemoryCalibration {
    /// Wrap pre-collected samples
    pub fn new(samples: Vec<CalibrationSample>) -> Self {
        Self { samples }
    }

    /// Convenience constructor for a single-input model
    pub fn single_input(input: &str, batches: Vec<Vec<f32>>) -> Self {
        let samples = batches
            .into_iter()
            .map(|values| {
                let mut sample = CalibrationSample::default();
                sample.insert(input.to_string(), values);
                sample
            })
            .collect();
        Self { samples }
    }
}

impl CalibrationSource for InMemoryCalibration {
    fn samples(&self) -> Box<dyn Iterator<Item = ConvertResult<CalibrationSample>> + '_> {
        Box::new(self.samples.iter().cloned().map(Ok))
    }
}

/// Affine quantization parameters mapping f32 onto int8
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    /// Smallest observed value, widened to include zero
    pub min: f32,
    /// Largest observed value, widened to include zero
    pub max: f32,
    /// Step between adjacent quantized values
    pub scale: f32,
    /// Quantized value that maps back to real zero
    pub zero_point: i64,
}

impl QuantParams {
    /// Derive parameters from an observed value range
    ///
    /// The range is widened to include zero so that zero is exactly
    /// representable, which padding and zero-initialized accumulators rely
    /// on. A degenerate all-zero range quantizes with unit scale.
    pub fn from_range(min: f32, max: f32) -> Self {
        let min = min.min(0.0);
        let max = max.max(0.0);
        if min == 0.0 && max == 0.0 {
            return Self {
                min,
                max,
                scale: 1.0,
                zero_point: 0,
            };
        }
        let scale = (max - min) / 255.0;
        let zero_point = (-128.0 - min / scale).round().clamp(-128.0, 127.0) as i64;
        Self {
            min,
            max,
            scale,
            zero_point,
        }
    }

    /// Quantize one value
    pub fn quantize(&self, value: f32) -> i8 {
        let q = (value / self.scale).round() as i64 + self.zero_point;
        q.clamp(i8::MIN as i64, i8::MAX as i64) as i8
    }

    /// Reconstruct the real value of one quantized step
    pub fn dequantize(&self, value: i8) -> f32 {
        (value as i64 - self.zero_point) as f32 * self.scale
    }
}

/// Observed min/max per graph input
pub type InputRanges = FxHashMap<String, (f32, f32)>;

/// Run the calibration set and record per-input value ranges
///
/// Fails with [`ConvertError::CalibrationMissing`] when the source yields no
/// samples, and with [`ConvertError::Cancelled`] when the token trips between
/// samples.
pub fn observe_ranges(
    source: &dyn CalibrationSource,
    cancel: &CancelToken,
) -> ConvertResult<InputRanges> {
    let mut ranges = InputRanges::default();
    let mut seen = 0usize;

    for sample in source.samples() {
        cancel.check()?;
        let sample = sample?;
        seen += 1;
        for (input, values) in sample {
            let entry = ranges
                .entry(input)
                .or_insert((f32::INFINITY, f32::NEG_INFINITY));
            for v in values {
                if v.is_finite() {
                    entry.0 = entry.0.min(v);
                    entry.1 = entry.1.max(v);
                }
            }
        }
    }

    if seen == 0 {
        return Err(ConvertError::CalibrationMissing);
    }

    // An input whose samples were all non-finite has no usable range
    for (input, (min, max)) in &ranges {
        if min > max {
            return Err(ConvertError::Export(format!(
                "calibration produced no finite values for input '{}'",
                input
            )));
        }
    }
    tracing::debug!(samples = seen, inputs = ranges.len(), "calibration complete");

    Ok(ranges)
}

/// Quantize a weight tensor from its own value range
pub fn quantize_weights(values: &[f32]) -> (Vec<i8>, QuantParams) {
    let mut min = 0.0f32;
    let mut max = 0.0f32;
    for &v in values {
        if v.is_finite() {
            min = min.min(v);
            max = max.max(v);
        }
    }
    let params = QuantParams::from_range(min, max);
    let data = values.iter().map(|&v| params.quantize(v)).collect();
    (data, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_includes_zero() {
        let p = QuantParams::from_range(2.0, 6.0);
        assert_eq!(p.min, 0.0);
        assert_eq!(p.max, 6.0);
        assert!((p.dequantize(p.quantize(0.0))).abs() < p.scale);
    }

    #[test]
    fn test_symmetric_range() {
        let p = QuantParams::from_range(-1.0, 1.0);
        assert!((p.scale - 2.0 / 255.0).abs() < 1e-6);
        let q = p.quantize(1.0);
        assert!((p.dequantize(q) - 1.0).abs() < p.scale);
    }

    #[test]
    fn test_degenerate_range() {
        let p = QuantParams::from_range(0.0, 0.0);
        assert_eq!(p.scale, 1.0);
        assert_eq!(p.quantize(0.0), 0);
    }

    #[test]
    fn test_observe_ranges() {
        let source = InMemoryCalibration::single_input(
            "x",
            vec![vec![-0.5, 0.25], vec![1.5, 0.0]],
        );
        let ranges = observe_ranges(&source, &CancelToken::new()).unwrap();
        assert_eq!(ranges["x"], (-0.5, 1.5));
    }

    #[test]
    fn test_empty_source_rejected() {
        let source = InMemoryCalibration::default();
        let err = observe_ranges(&source, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ConvertError::CalibrationMissing));
    }

    #[test]
    fn test_cancellation_between_samples() {
        let source = InMemoryCalibration::single_input("x", vec![vec![1.0]]);
        let token = CancelToken::new();
        token.cancel();
        let err = observe_ranges(&source, &token).unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled));
    }

    #[test]
    fn test_weight_quantization_round_trip() {
        let weights = [-2.0f32, -1.0, 0.0, 0.5, 2.0];
        let (data, params) = quantize_weights(&weights);
        assert_eq!(data.len(), weights.len());
        for (&q, &w) in data.iter().zip(&weights) {
            assert!((params.dequantize(q) - w).abs() <= params.scale);
        }
    }
}
