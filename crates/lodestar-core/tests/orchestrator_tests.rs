//! End-to-end query tests: text in, ranked items out.

use lodestar_core::config::{QuantizationConfig, QueryConfig};
use lodestar_core::quantization::{Embedding, EmbeddingModel, FallbackReason, ModelMode};
use lodestar_core::{
    DistanceMetric, Embedder, HnswIndex, IndexedItem, MetadataValue, QuantizationEngine,
    QueryFallbackReason, QueryOrchestrator, QueryRequest, QueryStatus, Result,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const CORPUS: [(&str, &str); 6] = [
    ("battery", "how to replace the battery of the remote"),
    ("wifi", "connect the device to a wireless network"),
    ("reset", "restore factory settings after a crash"),
    ("warranty", "warranty terms and repair service"),
    ("cleaning", "clean the lens with a dry cloth"),
    ("update", "install the latest firmware update"),
];

const WORDS: [&str; 16] = [
    "battery", "network", "device", "firmware", "screen", "reset", "cloth", "repair", "remote",
    "update", "service", "lens", "power", "cable", "settings", "light",
];

fn calibration_texts(count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(17);
    (0..count)
        .map(|_| {
            WORDS
                .choose_multiple(&mut rng, 5)
                .copied()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

struct Retrieval {
    engine: Arc<QuantizationEngine>,
    index: Arc<HnswIndex>,
}

fn retrieval() -> Retrieval {
    let model = EmbeddingModel::random_projection(512, 128, 99).unwrap();
    let engine = Arc::new(QuantizationEngine::new(QuantizationConfig::default()).unwrap());
    engine
        .initialize(QuantizationConfig::default(), model.clone())
        .unwrap();

    let calibration = calibration_texts(150)
        .iter()
        .map(|text| engine.features(text))
        .collect::<Result<Vec<_>>>()
        .unwrap();
    let result = engine.quantize(&model, &calibration);
    assert!(result.activated, "{:?}", result.failure);

    let index = Arc::new(HnswIndex::new(128, DistanceMetric::Cosine).unwrap());
    for (id, text) in CORPUS {
        let embedding = engine.embed(text).unwrap();
        index
            .insert(IndexedItem::new(id, embedding.vector).with_metadata("text", text))
            .unwrap();
    }
    Retrieval { engine, index }
}

fn orchestrator(retrieval: &Retrieval) -> QueryOrchestrator {
    QueryOrchestrator::new(
        Arc::clone(&retrieval.engine) as Arc<dyn Embedder>,
        Arc::clone(&retrieval.index) as _,
        QueryConfig::default(),
    )
    .unwrap()
}

#[test]
fn test_int8_query_finds_matching_document() {
    let retrieval = retrieval();
    let orch = orchestrator(&retrieval);

    let response = orch.query(QueryRequest::new("restore factory settings after a crash"));
    assert_eq!(response.status, QueryStatus::Success);
    assert!(!response.fallback);
    assert_eq!(response.model_mode, Some(ModelMode::Int8));
    assert_eq!(response.results[0].id, "reset");
    assert!(response.results[0].score > 0.99);
    assert_eq!(
        response.results[0].metadata.get("text"),
        Some(&MetadataValue::String(
            "restore factory settings after a crash".into()
        ))
    );
    assert!(response.results.iter().all(|r| r.score >= 0.5));
    assert!(response
        .results
        .windows(2)
        .all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_fp32_fallback_is_reported_but_still_answers() {
    let retrieval = retrieval();
    retrieval
        .engine
        .force_fallback(FallbackReason::ManualOverride)
        .unwrap();
    let orch = orchestrator(&retrieval);

    let response = orch.query(QueryRequest::new("install the latest firmware update"));
    assert_eq!(response.status, QueryStatus::Fallback);
    assert!(response.fallback);
    assert_eq!(response.fallback_reason, Some(QueryFallbackReason::Fp32Model));
    assert_eq!(response.model_mode, Some(ModelMode::Fp32));
    assert_eq!(response.results[0].id, "update");
    assert_eq!(orch.stats().fallback_count, 1);
}

struct SlowEmbedder {
    inner: Arc<QuantizationEngine>,
    delay: Duration,
}

impl Embedder for SlowEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        thread::sleep(self.delay);
        self.inner.embed(text)
    }
}

#[test]
fn test_deadline_returns_timeout_without_waiting_for_worker() {
    let retrieval = retrieval();
    let slow = SlowEmbedder {
        inner: Arc::clone(&retrieval.engine),
        delay: Duration::from_millis(400),
    };
    let orch = QueryOrchestrator::new(
        Arc::new(slow),
        Arc::clone(&retrieval.index) as _,
        QueryConfig::default(),
    )
    .unwrap();

    let started = Instant::now();
    let response = orch.query(
        QueryRequest::new("clean the lens with a dry cloth").with_timeout(Duration::from_millis(20)),
    );
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(response.status, QueryStatus::Timeout);
    assert!(response.fallback);
    assert_eq!(response.fallback_reason, Some(QueryFallbackReason::Timeout));
    assert!(response.results.is_empty());

    // Worker pool keeps serving once the slow worker is abandoned.
    let answered = orch.query(QueryRequest::new("clean the lens with a dry cloth"));
    assert_eq!(answered.status, QueryStatus::Success);
    assert_eq!(answered.results[0].id, "cleaning");

    let stats = orch.stats();
    assert_eq!(stats.total_queries, 2);
    assert_eq!(stats.timeout_count, 1);
    assert_eq!(stats.success_count, 1);
}

#[test]
fn test_concurrent_queries_get_distinct_ids() {
    let retrieval = retrieval();
    let orch = Arc::new(orchestrator(&retrieval));
    let handles: Vec<_> = CORPUS
        .iter()
        .map(|&(id, text)| {
            let orch = Arc::clone(&orch);
            thread::spawn(move || {
                let response = orch.query(QueryRequest::new(text).with_top_k(1));
                assert_eq!(response.results.len(), 1);
                assert_eq!(response.results[0].id, id);
                response.query_id
            })
        })
        .collect();
    let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), CORPUS.len());
    assert_eq!(orch.stats().total_queries, CORPUS.len() as u64);
}
