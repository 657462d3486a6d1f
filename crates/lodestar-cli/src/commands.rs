//! Subcommand implementations.

use crate::corpus::read_documents;
use crate::store::Store;
use anyhow::{Context, Result};
use lodestar_core::index::hnsw::load_meta;
use lodestar_core::quantization::EmbeddingModel;
use lodestar_core::{
    HnswIndex, IndexedItem, LodestarConfig, QuantizationEngine, QueryOrchestrator, QueryRequest,
    QueryResponse,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Options of the `build` subcommand.
pub struct BuildOptions {
    pub docs: PathBuf,
    pub out: PathBuf,
    pub model: Option<PathBuf>,
    pub input_dim: usize,
    pub dim: usize,
    pub seed: u64,
}

/// Embeds a JSONL corpus, quantizes the model on it and writes a retrieval directory.
pub fn build(config: &LodestarConfig, options: &BuildOptions) -> Result<()> {
    let started = Instant::now();
    let documents = read_documents(&options.docs)?;
    tracing::info!(documents = documents.len(), "corpus loaded");

    let model = match &options.model {
        Some(path) => EmbeddingModel::from_bytes(
            &fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        )?,
        None => EmbeddingModel::random_projection(options.input_dim, options.dim, options.seed)?,
    };

    let engine = QuantizationEngine::new(config.quantization.clone())?;
    engine.initialize(config.quantization.clone(), model.clone())?;

    let calibration = documents
        .iter()
        .map(|doc| engine.features(&doc.text))
        .collect::<lodestar_core::Result<Vec<_>>>()?;
    let result = engine.quantize(&model, &calibration);
    match (&result.failure, &result.warning) {
        (Some(failure), _) => println!("int8 quantization failed, serving fp32: {failure}"),
        (None, Some(warning)) => println!("int8 model accepted with warning: {warning}"),
        (None, None) => println!(
            "int8 model accepted: similarity {:.4}, compression {:.1}x",
            result.measured_similarity, result.compression_ratio
        ),
    }

    let index = HnswIndex::with_seed(
        model.output_dim(),
        config.index.distance_metric,
        config.index.params(),
        config.index.seed,
    )?;
    for doc in documents {
        let embedding = engine.embed(&doc.text)?;
        index
            .insert(IndexedItem {
                id: doc.id,
                vector: embedding.vector,
                metadata: doc.metadata,
            })
            .context("indexing document")?;
    }

    Store::save(&options.out, &model, &engine, &index)?;
    println!(
        "indexed {} documents into {} in {:.2?}",
        index.len(),
        options.out.display(),
        started.elapsed()
    );
    Ok(())
}

/// Options of the `query` subcommand.
pub struct QueryOptions {
    pub data: PathBuf,
    pub text: String,
    pub top_k: Option<usize>,
    pub threshold: Option<f32>,
    pub timeout_ms: Option<u64>,
    pub json: bool,
}

/// Runs one query. Returns whether it was answered.
pub fn query(config: &LodestarConfig, options: QueryOptions) -> Result<bool> {
    let store = Store::open(&options.data, config)?;
    let orchestrator = QueryOrchestrator::new(store.engine, store.index, config.query.clone())?;

    let mut request = QueryRequest::new(options.text);
    request.top_k = options.top_k;
    request.threshold = options.threshold;
    request.timeout = options.timeout_ms.map(Duration::from_millis);
    let response = orchestrator.query(request);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&response.to_json())?);
    } else {
        print_response(&response);
    }
    Ok(response.is_answered())
}

fn print_response(response: &QueryResponse) {
    let mode = response
        .model_mode
        .map_or_else(|| "-".to_string(), |m| m.to_string());
    println!(
        "status: {}  model: {}  latency: {:.2?}",
        response.status, mode, response.latency
    );
    if let Some(error) = &response.error {
        println!("error: {error}");
    }
    if response.results.is_empty() && response.is_answered() {
        println!("no results above threshold");
    }
    for (rank, result) in response.results.iter().enumerate() {
        let text = result
            .metadata
            .get("text")
            .map(|v| v.to_json().to_string())
            .unwrap_or_default();
        println!("{:>2}. {:<24} {:.4}  {}", rank + 1, result.id, result.score, text);
    }
}

/// Prints index, model and engine state of a retrieval directory.
pub fn status(config: &LodestarConfig, data: &Path) -> Result<()> {
    let meta = load_meta(data)?;
    let store = Store::open(data, config)?;
    let report = serde_json::json!({
        "format_version": meta.format_version,
        "graph_sha256": meta.graph_sha256,
        "index": store.index.stats(),
        "engine": store.engine.status(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Prints the effective configuration as TOML.
pub fn show_config(config: &LodestarConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

