//! Block-wise weight quantization under a memory budget.
//!
//! A weight matrix is cut into blocks of whole rows holding about
//! `block_size` elements. Blocks are quantized and validated independently on
//! a pool of `max_concurrent_blocks` threads, so the transient working set is
//! bounded by the block size rather than the model size. In per-tensor mode a
//! streaming pass computes the shared scale first.

use super::model::EmbeddingModel;
use super::tensor::{absmax, check_shape, quantize_rows, symmetric_scale, Granularity, QuantizedTensor};
use crate::config::{QuantizationConfig, TilingConfig};
use crate::error::{Error, Result};
use rayon::prelude::*;
use rayon::ThreadPool;

/// Bytes touched per weight while quantizing: the fp32 source read and the int8 code written.
pub const BYTES_PER_WEIGHT: u64 = 5;

/// Relative slack on the half-step bound when validating a block.
const VALIDATION_TOLERANCE: f32 = 1e-4;

/// Rows per block for a matrix with `cols` columns.
#[must_use]
pub fn rows_per_block(block_size: usize, cols: usize) -> usize {
    (block_size / cols.max(1)).max(1)
}

/// Peak transient working set of quantizing `model` under `config`, in bytes.
///
/// Untiled, every weight of the largest layer is in flight at once. Tiled,
/// at most `max_concurrent_blocks` blocks are.
#[must_use]
pub fn estimate_working_set(model: &EmbeddingModel, config: &QuantizationConfig) -> u64 {
    model
        .layers()
        .iter()
        .map(|layer| {
            let rows = layer.output_dim();
            let cols = layer.input_dim();
            let elements = if config.tiling.enabled {
                let per_block = rows_per_block(config.tiling.block_size, cols).min(rows);
                let blocks = rows.div_ceil(per_block);
                per_block * cols * config.tiling.max_concurrent_blocks.min(blocks)
            } else {
                rows * cols
            };
            elements as u64 * BYTES_PER_WEIGHT
        })
        .max()
        .unwrap_or(0)
}

/// Checks the working set of quantizing `model` against the configured budget.
///
/// # Errors
///
/// Returns [`Error::MemoryBudgetExceeded`] if the estimate is over budget.
pub fn check_memory_budget(model: &EmbeddingModel, config: &QuantizationConfig) -> Result<u64> {
    let required_bytes = estimate_working_set(model, config);
    let budget_bytes = config.memory_budget_bytes();
    if required_bytes > budget_bytes {
        return Err(Error::MemoryBudgetExceeded {
            required_bytes,
            budget_bytes,
        });
    }
    Ok(required_bytes)
}

/// Quantizes weight matrices block by block on a bounded pool.
pub struct TiledQuantizer {
    config: TilingConfig,
    pool: ThreadPool,
}

impl TiledQuantizer {
    /// Creates the block pool.
    pub fn new(config: TilingConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrent_blocks.max(1))
            .thread_name(|idx| format!("lodestar-quant-{idx}"))
            .build()?;
        Ok(Self { config, pool })
    }

    /// Quantizes a row-major `rows x cols` matrix.
    ///
    /// Produces the same codes and scales as [`QuantizedTensor::quantize`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModel`] on a bad shape or if a block fails validation.
    pub fn quantize(
        &self,
        weights: &[f32],
        rows: usize,
        cols: usize,
        granularity: Granularity,
    ) -> Result<QuantizedTensor> {
        check_shape(weights, rows, cols)?;
        let block_rows = rows_per_block(self.config.block_size, cols);
        let shared = match granularity {
            Granularity::PerTensor => Some(symmetric_scale(
                weights
                    .chunks(block_rows * cols)
                    .map(absmax)
                    .fold(0.0, f32::max),
            )),
            Granularity::PerChannel => None,
        };

        let blocks: Vec<(Vec<i8>, Vec<f32>)> = self.pool.install(|| {
            weights
                .par_chunks(block_rows * cols)
                .enumerate()
                .map(|(index, block)| {
                    let (codes, scales) = quantize_rows(block, cols, shared);
                    validate_block(index, block, &codes, &scales, shared, cols)?;
                    Ok((codes, scales))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        tracing::debug!(rows, cols, blocks = blocks.len(), "tiled quantization complete");

        let mut values = Vec::with_capacity(weights.len());
        let mut scales = Vec::with_capacity(rows);
        for (codes, block_scales) in blocks {
            values.extend(codes);
            scales.extend(block_scales);
        }
        if let Some(scale) = shared {
            scales = vec![scale];
        }
        QuantizedTensor::from_parts(values, scales, rows, cols, granularity)
    }
}

fn validate_block(
    index: usize,
    block: &[f32],
    codes: &[i8],
    scales: &[f32],
    shared: Option<f32>,
    cols: usize,
) -> Result<()> {
    for (r, (row, row_codes)) in block.chunks(cols).zip(codes.chunks(cols)).enumerate() {
        let scale = shared.unwrap_or(scales[r]);
        let bound = scale / 2.0 * (1.0 + VALIDATION_TOLERANCE);
        let worst = row
            .iter()
            .zip(row_codes)
            .map(|(&w, &q)| (f32::from(q) * scale - w).abs())
            .fold(0.0, f32::max);
        if worst > bound {
            return Err(Error::InvalidModel(format!(
                "block {index} row {r}: reconstruction error {worst} exceeds {bound}"
            )));
        }
    }
    Ok(())
}
