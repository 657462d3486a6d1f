//! Retrieval directory layout.
//!
//! A directory holds the HNSW snapshot (`hnsw_meta.bin`, `hnsw_graph.bin`),
//! the fp32 model (`model.bin`) and, when quantization was accepted, the int8
//! artifact (`quantized.bin`).

use anyhow::{Context, Result};
use lodestar_core::quantization::{EmbeddingModel, QuantizationArtifact};
use lodestar_core::{HnswIndex, LodestarConfig, QuantizationEngine};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const MODEL_FILE: &str = "model.bin";
pub const QUANTIZED_FILE: &str = "quantized.bin";

/// Engine and index loaded from a retrieval directory.
pub struct Store {
    pub engine: Arc<QuantizationEngine>,
    pub index: Arc<HnswIndex>,
}

impl Store {
    /// Writes the model, the int8 artifact (if any) and the index into `dir`.
    pub fn save(
        dir: &Path,
        model: &EmbeddingModel,
        engine: &QuantizationEngine,
        index: &HnswIndex,
    ) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        index.save(dir)?;
        fs::write(dir.join(MODEL_FILE), model.to_bytes()?)?;

        let quantized = dir.join(QUANTIZED_FILE);
        match engine.artifact() {
            Some(artifact) => fs::write(&quantized, artifact.to_bytes()?)?,
            // A stale artifact must not outlive the model it was built from.
            None if quantized.exists() => fs::remove_file(&quantized)?,
            None => {}
        }
        Ok(())
    }

    /// Loads a directory written by [`Store::save`].
    pub fn open(dir: &Path, config: &LodestarConfig) -> Result<Self> {
        let model_path = dir.join(MODEL_FILE);
        let model = EmbeddingModel::from_bytes(
            &fs::read(&model_path).with_context(|| format!("reading {}", model_path.display()))?,
        )?;

        let engine = QuantizationEngine::new(config.quantization.clone())?;
        engine.initialize(config.quantization.clone(), model)?;

        let quantized = dir.join(QUANTIZED_FILE);
        if quantized.exists() {
            let artifact = QuantizationArtifact::from_bytes(&fs::read(&quantized)?)?;
            let result = engine.activate(artifact)?;
            if let Some(failure) = &result.failure {
                tracing::warn!(%failure, "stored int8 model not activated");
            }
        } else {
            tracing::info!("no int8 model stored, serving fp32");
        }

        let index = HnswIndex::load(dir)?;
        Ok(Self {
            engine: Arc::new(engine),
            index: Arc::new(index),
        })
    }
}
