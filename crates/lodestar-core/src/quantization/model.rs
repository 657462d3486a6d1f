//! Dense embedding models: the fp32 reference and its int8 counterpart.
//!
//! Weights are stored row-major as `output_dim x input_dim`, so a weight row
//! is one output channel. The int8 forward pass quantizes each layer input to
//! uint8, accumulates `(x_q - zero_point) * w_q` in `i64` and rescales with
//! `x_scale * w_scale[row]` before adding the fp32 bias.

use super::calibration::calibrate;
use super::tensor::{check_shape, ActivationParams, QuantizedTensor};
use super::tiling::TiledQuantizer;
use crate::config::QuantizationConfig;
use crate::distance::l2_normalize;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Element-wise activation applied after a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// `f(x) = x`
    #[default]
    Identity,
    /// `f(x) = max(x, 0)`
    Relu,
    /// `f(x) = tanh(x)`
    Tanh,
}

impl Activation {
    /// Applies the activation to one value.
    #[inline]
    #[must_use]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Identity => x,
            Self::Relu => x.max(0.0),
            Self::Tanh => x.tanh(),
        }
    }
}

/// A fully connected fp32 layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    weights: Vec<f32>,
    bias: Vec<f32>,
    input_dim: usize,
    output_dim: usize,
    activation: Activation,
}

impl DenseLayer {
    /// Creates a layer from row-major `output_dim x input_dim` weights.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModel`] on inconsistent shapes or non-finite values.
    pub fn new(
        weights: Vec<f32>,
        bias: Vec<f32>,
        input_dim: usize,
        output_dim: usize,
        activation: Activation,
    ) -> Result<Self> {
        check_shape(&weights, output_dim, input_dim)?;
        if bias.len() != output_dim {
            return Err(Error::InvalidModel(format!(
                "bias has {} values for {output_dim} outputs",
                bias.len()
            )));
        }
        if weights.iter().chain(&bias).any(|v| !v.is_finite()) {
            return Err(Error::InvalidModel("non-finite weight or bias".into()));
        }
        Ok(Self {
            weights,
            bias,
            input_dim,
            output_dim,
            activation,
        })
    }

    /// Input width.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Output width.
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Activation function.
    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Row-major weights.
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Bias vector.
    #[must_use]
    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    /// Number of weights and biases.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .chunks_exact(self.input_dim)
            .zip(&self.bias)
            .map(|(row, b)| {
                let acc: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                self.activation.apply(acc + b)
            })
            .collect()
    }
}

/// An fp32 feed-forward embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingModel {
    layers: Vec<DenseLayer>,
    normalize_output: bool,
}

impl EmbeddingModel {
    /// Chains `layers`; each layer's input must match the previous output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModel`] if there are no layers or widths do not chain.
    pub fn new(layers: Vec<DenseLayer>, normalize_output: bool) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidModel("model has no layers".into()));
        }
        if let Some(i) = layers
            .windows(2)
            .position(|pair| pair[0].output_dim != pair[1].input_dim)
        {
            return Err(Error::InvalidModel(format!(
                "layer {} outputs {} values but layer {} expects {}",
                i,
                layers[i].output_dim,
                i + 1,
                layers[i + 1].input_dim
            )));
        }
        Ok(Self {
            layers,
            normalize_output,
        })
    }

    /// Single-layer random projection with L2-normalized output.
    ///
    /// Deterministic for a given `seed`.
    pub fn random_projection(input_dim: usize, output_dim: usize, seed: u64) -> Result<Self> {
        Self::random(&[input_dim, output_dim], Activation::Identity, seed)
    }

    /// Random MLP with widths `dims` (at least two entries), `hidden` between
    /// layers and identity on the last one. Output is L2-normalized.
    pub fn random(dims: &[usize], hidden: Activation, seed: u64) -> Result<Self> {
        if dims.len() < 2 {
            return Err(Error::InvalidModel(
                "a model needs an input and an output width".into(),
            ));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let (input_dim, output_dim) = (pair[0], pair[1]);
                #[allow(clippy::cast_precision_loss)]
                let bound = (3.0 / input_dim.max(1) as f32).sqrt();
                let count = input_dim.checked_mul(output_dim).ok_or_else(|| {
                    Error::InvalidModel(format!("{output_dim}x{input_dim} layer is too large"))
                })?;
                let weights = (0..count)
                    .map(|_| rng.gen_range(-bound..=bound))
                    .collect();
                let activation = if i + 2 == dims.len() {
                    Activation::Identity
                } else {
                    hidden
                };
                DenseLayer::new(weights, vec![0.0; output_dim], input_dim, output_dim, activation)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(layers, true)
    }

    /// Layers in evaluation order.
    #[must_use]
    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Whether outputs are L2-normalized.
    #[must_use]
    pub fn normalize_output(&self) -> bool {
        self.normalize_output
    }

    /// Input width.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.layers[0].input_dim
    }

    /// Output (embedding) width.
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].output_dim
    }

    /// Number of weights and biases.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::param_count).sum()
    }

    /// Bytes held by fp32 parameters.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.param_count() * std::mem::size_of::<f32>()
    }

    /// Runs the fp32 forward pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `input` has the wrong width.
    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>> {
        let mut out = self.layer_inputs(input)?.pop().unwrap_or_default();
        if self.normalize_output {
            l2_normalize(&mut out);
        }
        Ok(out)
    }

    /// Input of every layer followed by the raw (unnormalized) output.
    pub(crate) fn layer_inputs(&self, input: &[f32]) -> Result<Vec<Vec<f32>>> {
        check_width(self.input_dim(), input.len())?;
        let mut trace = Vec::with_capacity(self.layers.len() + 1);
        trace.push(input.to_vec());
        for layer in &self.layers {
            let next = layer.forward(&trace[trace.len() - 1]);
            trace.push(next);
        }
        Ok(trace)
    }

    /// Serializes the model with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes and revalidates a model.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: Self = bincode::deserialize(bytes)?;
        let layers = model
            .layers
            .into_iter()
            .map(|l| DenseLayer::new(l.weights, l.bias, l.input_dim, l.output_dim, l.activation))
            .collect::<Result<Vec<_>>>()?;
        Self::new(layers, model.normalize_output)
    }
}

/// A dense layer with int8 weights and calibrated uint8 inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedLayer {
    weights: QuantizedTensor,
    bias: Vec<f32>,
    input: ActivationParams,
    activation: Activation,
}

impl QuantizedLayer {
    /// Int8 weights.
    #[must_use]
    pub fn weights(&self) -> &QuantizedTensor {
        &self.weights
    }

    /// Calibrated input quantization.
    #[must_use]
    pub fn input_params(&self) -> ActivationParams {
        self.input
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let codes: Vec<i64> = input
            .iter()
            .map(|&x| i64::from(self.input.quantize(x)) - i64::from(self.input.zero_point))
            .collect();
        (0..self.weights.rows())
            .zip(&self.bias)
            .map(|(r, b)| {
                // 127 * 255 per term leaves no headroom in i32 past ~66k inputs.
                let acc: i64 = self
                    .weights
                    .row(r)
                    .iter()
                    .zip(&codes)
                    .map(|(&w, &x)| i64::from(w) * x)
                    .sum();
                #[allow(clippy::cast_precision_loss)]
                let y = acc as f32 * self.input.scale * self.weights.scale(r) + b;
                self.activation.apply(y)
            })
            .collect()
    }

    fn size_bytes(&self) -> usize {
        self.weights.size_bytes()
            + self.bias.len() * std::mem::size_of::<f32>()
            + std::mem::size_of::<ActivationParams>()
    }
}

/// Int8 version of an [`EmbeddingModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedModel {
    layers: Vec<QuantizedLayer>,
    normalize_output: bool,
    fp32_size_bytes: usize,
}

impl QuantizedModel {
    /// Quantizes `model`, calibrating every layer input on `calibration`.
    ///
    /// Weights are quantized block-wise when tiling is enabled.
    pub fn quantize(
        model: &EmbeddingModel,
        calibration: &[Vec<f32>],
        config: &QuantizationConfig,
    ) -> Result<Self> {
        let traces = calibration
            .iter()
            .map(|sample| model.layer_inputs(sample))
            .collect::<Result<Vec<_>>>()?;
        let tiler = if config.tiling.enabled {
            Some(TiledQuantizer::new(config.tiling)?)
        } else {
            None
        };

        let mut layers = Vec::with_capacity(model.layers.len());
        for (i, layer) in model.layers.iter().enumerate() {
            let inputs: Vec<&[f32]> = traces.iter().map(|t| t[i].as_slice()).collect();
            let input = calibrate(&inputs, config.calibration_strategy, config.percentile);
            let weights = match &tiler {
                Some(tiler) => tiler.quantize(
                    &layer.weights,
                    layer.output_dim,
                    layer.input_dim,
                    config.granularity,
                )?,
                None => QuantizedTensor::quantize(
                    &layer.weights,
                    layer.output_dim,
                    layer.input_dim,
                    config.granularity,
                )?,
            };
            tracing::debug!(
                layer = i,
                scale = input.scale,
                zero_point = input.zero_point,
                "layer calibrated"
            );
            layers.push(QuantizedLayer {
                weights,
                bias: layer.bias.clone(),
                input,
                activation: layer.activation,
            });
        }
        Ok(Self {
            layers,
            normalize_output: model.normalize_output,
            fp32_size_bytes: model.size_bytes(),
        })
    }

    /// Layers in evaluation order.
    #[must_use]
    pub fn layers(&self) -> &[QuantizedLayer] {
        &self.layers
    }

    /// Input width.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.layers[0].weights.cols()
    }

    /// Output (embedding) width.
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].weights.rows()
    }

    /// Bytes held by codes, scales, biases and activation parameters.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.layers.iter().map(QuantizedLayer::size_bytes).sum()
    }

    /// fp32 size divided by int8 size.
    #[must_use]
    pub fn compression_ratio(&self) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.fp32_size_bytes as f32 / self.size_bytes().max(1) as f32;
        ratio
    }

    /// Runs the int8 forward pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `input` has the wrong width.
    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>> {
        check_width(self.input_dim(), input.len())?;
        let mut out = self
            .layers
            .iter()
            .fold(input.to_vec(), |x, layer| layer.forward(&x));
        if self.normalize_output {
            l2_normalize(&mut out);
        }
        Ok(out)
    }

    /// Serializes the model with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes a model and checks that its layers chain.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: Self = bincode::deserialize(bytes)?;
        model.validate()?;
        Ok(model)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Error::InvalidModel("quantized model has no layers".into()));
        }
        let chained = self
            .layers
            .windows(2)
            .all(|pair| pair[0].weights.rows() == pair[1].weights.cols());
        let biased = self
            .layers
            .iter()
            .all(|l| l.weights.is_consistent() && l.bias.len() == l.weights.rows());
        if !chained || !biased {
            return Err(Error::InvalidModel("quantized layer shapes do not chain".into()));
        }
        let calibrated = self.layers.iter().all(|l| {
            l.input.scale.is_finite() && l.input.scale > 0.0 && (0..=255).contains(&l.input.zero_point)
        });
        if !calibrated {
            return Err(Error::InvalidModel("invalid activation quantization parameters".into()));
        }
        Ok(())
    }
}

fn check_width(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { expected, actual })
    }
}
