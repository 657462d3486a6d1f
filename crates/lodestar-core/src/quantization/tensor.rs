//! Int8 weight tensors and uint8 activation parameters.
//!
//! Weights are quantized symmetrically: `q = clamp(round(w / scale), -127, 127)`
//! with `scale = max|w| / 127`, one scale per output row (channel) or one for
//! the whole tensor. Activations are quantized asymmetrically to `0..=255`
//! with a zero point, over a range that always contains zero.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Largest magnitude of a symmetric int8 code.
pub const INT8_MAX_CODE: f32 = 127.0;

/// Number of steps of an asymmetric uint8 code.
pub const UINT8_LEVELS: f32 = 255.0;

/// Scale granularity of weight quantization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One scale for the whole tensor.
    PerTensor,
    /// One scale per output channel (row).
    #[default]
    PerChannel,
}

/// Scale mapping `[-absmax, absmax]` onto `[-127, 127]`.
///
/// An all-zero (or non-finite) range gets scale 1.0 so every value maps to 0.
#[inline]
#[must_use]
pub fn symmetric_scale(absmax: f32) -> f32 {
    if absmax > 0.0 && absmax.is_finite() {
        absmax / INT8_MAX_CODE
    } else {
        1.0
    }
}

/// Quantizes one weight with a symmetric scale.
#[inline]
#[must_use]
pub fn quantize_symmetric(value: f32, scale: f32) -> i8 {
    // SAFETY: clamped to [-127, 127] before the cast.
    #[allow(clippy::cast_possible_truncation)]
    let q = (value / scale).round().clamp(-INT8_MAX_CODE, INT8_MAX_CODE) as i8;
    q
}

pub(crate) fn absmax(values: &[f32]) -> f32 {
    values.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()))
}

/// A row-major `rows x cols` int8 tensor with its dequantization scales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedTensor {
    values: Vec<i8>,
    scales: Vec<f32>,
    rows: usize,
    cols: usize,
    granularity: Granularity,
}

impl QuantizedTensor {
    /// Quantizes a row-major `rows x cols` weight matrix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModel`] if `weights.len() != rows * cols`.
    pub fn quantize(
        weights: &[f32],
        rows: usize,
        cols: usize,
        granularity: Granularity,
    ) -> Result<Self> {
        check_shape(weights, rows, cols)?;
        let (values, scales) = match granularity {
            Granularity::PerTensor => {
                let scale = symmetric_scale(absmax(weights));
                let values = weights.iter().map(|&w| quantize_symmetric(w, scale)).collect();
                (values, vec![scale])
            }
            Granularity::PerChannel => quantize_rows(weights, cols, None),
        };
        Ok(Self {
            values,
            scales,
            rows,
            cols,
            granularity,
        })
    }

    /// Assembles a tensor from already quantized parts.
    pub(crate) fn from_parts(
        values: Vec<i8>,
        scales: Vec<f32>,
        rows: usize,
        cols: usize,
        granularity: Granularity,
    ) -> Result<Self> {
        let tensor = Self {
            values,
            scales,
            rows,
            cols,
            granularity,
        };
        if !tensor.is_consistent() {
            return Err(Error::InvalidModel(format!(
                "tensor parts do not describe a {rows}x{cols} {granularity:?} tensor"
            )));
        }
        Ok(tensor)
    }

    /// Number of rows (output channels).
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (input features).
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Scale granularity.
    #[must_use]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Int8 codes, row-major.
    #[must_use]
    pub fn values(&self) -> &[i8] {
        &self.values
    }

    /// Codes of one row.
    #[inline]
    #[must_use]
    pub fn row(&self, row: usize) -> &[i8] {
        &self.values[row * self.cols..(row + 1) * self.cols]
    }

    /// Scale applying to `row`.
    #[inline]
    #[must_use]
    pub fn scale(&self, row: usize) -> f32 {
        match self.granularity {
            Granularity::PerTensor => self.scales[0],
            Granularity::PerChannel => self.scales[row],
        }
    }

    /// Reconstructs the fp32 weights.
    #[must_use]
    pub fn dequantize(&self) -> Vec<f32> {
        (0..self.rows)
            .flat_map(|r| {
                let scale = self.scale(r);
                self.row(r).iter().map(move |&q| f32::from(q) * scale)
            })
            .collect()
    }

    /// Largest reconstruction error allowed for `row`: half a quantization step.
    #[must_use]
    pub fn max_error_bound(&self, row: usize) -> f32 {
        self.scale(row) / 2.0
    }

    /// True if codes and scales match the declared shape.
    pub(crate) fn is_consistent(&self) -> bool {
        let expected_scales = match self.granularity {
            Granularity::PerTensor => 1,
            Granularity::PerChannel => self.rows,
        };
        self.rows > 0
            && self.cols > 0
            && self.rows.checked_mul(self.cols) == Some(self.values.len())
            && self.scales.len() == expected_scales
    }

    /// Bytes held by codes and scales.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.values.len() + self.scales.len() * std::mem::size_of::<f32>()
    }
}

/// Quantizes whole rows, with per-row scales or a shared `scale`.
pub(crate) fn quantize_rows(weights: &[f32], cols: usize, scale: Option<f32>) -> (Vec<i8>, Vec<f32>) {
    let mut values = Vec::with_capacity(weights.len());
    let mut scales = Vec::new();
    for row in weights.chunks(cols.max(1)) {
        let row_scale = scale.unwrap_or_else(|| symmetric_scale(absmax(row)));
        values.extend(row.iter().map(|&w| quantize_symmetric(w, row_scale)));
        if scale.is_none() {
            scales.push(row_scale);
        }
    }
    (values, scales)
}

pub(crate) fn check_shape(weights: &[f32], rows: usize, cols: usize) -> Result<()> {
    if rows == 0 || cols == 0 || rows.checked_mul(cols) != Some(weights.len()) {
        return Err(Error::InvalidModel(format!(
            "expected {rows}x{cols} weights, got {} values",
            weights.len()
        )));
    }
    Ok(())
}

/// Asymmetric uint8 quantization parameters of an activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivationParams {
    /// Step between two adjacent codes.
    pub scale: f32,
    /// Code representing 0.0.
    pub zero_point: i32,
}

impl ActivationParams {
    /// Parameters covering `[min, max]` widened to include zero.
    #[must_use]
    pub fn from_range(min: f32, max: f32) -> Self {
        let min = if min.is_finite() { min.min(0.0) } else { 0.0 };
        let max = if max.is_finite() { max.max(0.0) } else { 0.0 };
        let range = max - min;
        if range <= 0.0 {
            return Self {
                scale: 1.0,
                zero_point: 0,
            };
        }
        let scale = range / UINT8_LEVELS;
        // SAFETY: -min / scale lies in [0, 255] because min <= 0 <= max.
        #[allow(clippy::cast_possible_truncation)]
        let zero_point = (-min / scale).round().clamp(0.0, UINT8_LEVELS) as i32;
        Self { scale, zero_point }
    }

    /// Quantizes one activation value.
    #[inline]
    #[must_use]
    pub fn quantize(&self, value: f32) -> u8 {
        #[allow(clippy::cast_precision_loss)]
        let shifted = (value / self.scale).round() + self.zero_point as f32;
        // SAFETY: clamped to [0, 255] before the cast.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let q = shifted.clamp(0.0, UINT8_LEVELS) as u8;
        q
    }

    /// Reconstructs an activation value.
    #[inline]
    #[must_use]
    pub fn dequantize(&self, code: u8) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let centered = (i32::from(code) - self.zero_point) as f32;
        centered * self.scale
    }
}
