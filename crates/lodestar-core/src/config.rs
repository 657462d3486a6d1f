//! Configuration for Lodestar.
//!
//! Values are layered with `figment`, later sources overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. `lodestar.toml` (or an explicit file)
//! 3. `LODESTAR_*` environment variables, `__` separating sections
//!    (e.g. `LODESTAR_QUANTIZATION__FALLBACK_THRESHOLD=0.9`)
//!
//! # Example
//!
//! ```toml
//! [index]
//! m = 16
//! ef_construction = 200
//! ef_search = 64
//! distance_metric = "cosine"
//!
//! [quantization]
//! granularity = "per_channel"
//! calibration_strategy = "kl"
//! warning_threshold = 0.98
//! fallback_threshold = 0.95
//!
//! [quantization.tiling]
//! enabled = true
//! block_size = 65536
//! max_concurrent_blocks = 4
//! ```

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::HnswParams;
use crate::quantization::{CalibrationStrategy, Granularity};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name looked up in the working directory.
pub const CONFIG_FILE: &str = "lodestar.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "LODESTAR_";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LodestarConfig {
    /// Vector index settings.
    pub index: IndexConfig,
    /// Quantization engine settings.
    pub quantization: QuantizationConfig,
    /// Query orchestrator settings.
    pub query: QueryConfig,
    /// Logging settings (consumed by binaries).
    pub logging: LoggingConfig,
}

/// Vector index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Neighbor fan-out bound (M).
    pub m: usize,
    /// Build-time beam width.
    pub ef_construction: usize,
    /// Query-time beam width.
    pub ef_search: usize,
    /// Distance metric.
    pub distance_metric: DistanceMetric,
    /// Maximum number of items.
    pub max_elements: usize,
    /// Seed for level assignment.
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let params = HnswParams::default();
        Self {
            m: params.max_connections,
            ef_construction: params.ef_construction,
            ef_search: params.ef_search,
            distance_metric: DistanceMetric::Cosine,
            max_elements: params.max_elements,
            seed: crate::index::hnsw::DEFAULT_LEVEL_SEED,
        }
    }
}

impl IndexConfig {
    /// HNSW parameters described by this section.
    #[must_use]
    pub fn params(&self) -> HnswParams {
        HnswParams::custom(self.m, self.ef_construction, self.ef_search, self.max_elements)
    }
}

/// Block-wise quantization settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    /// Quantize weight tensors block by block.
    pub enabled: bool,
    /// Target block size in weight elements (rounded to whole rows).
    pub block_size: usize,
    /// Maximum blocks processed concurrently.
    pub max_concurrent_blocks: usize,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            block_size: 64 * 1024,
            max_concurrent_blocks: 4,
        }
    }
}

/// Quantization engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationConfig {
    /// Weight scale granularity.
    pub granularity: Granularity,
    /// Activation range calibration strategy.
    pub calibration_strategy: CalibrationStrategy,
    /// Fraction of |x| kept by the `percentile` strategy.
    pub percentile: f64,
    /// Similarity at or above which int8 is accepted without a warning.
    pub warning_threshold: f32,
    /// Similarity below which int8 is rejected.
    pub fallback_threshold: f32,
    /// Shadow-check live int8 inferences and fall back on degradation.
    pub enable_auto_fallback: bool,
    /// Fraction of int8 inferences that are shadow-checked.
    pub shadow_sample_rate: f64,
    /// Int8 latency above which a shadow check falls back (disabled if unset).
    pub max_latency_ms: Option<u64>,
    /// Quantization working-set budget.
    pub max_memory_mb: usize,
    /// Minimum number of calibration samples.
    pub min_calibration_samples: usize,
    /// Fraction of calibration samples held out for validation.
    pub validation_fraction: f64,
    /// Block-wise quantization.
    pub tiling: TilingConfig,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::PerChannel,
            calibration_strategy: CalibrationStrategy::MinMax,
            percentile: 0.999,
            warning_threshold: 0.98,
            fallback_threshold: 0.95,
            enable_auto_fallback: true,
            shadow_sample_rate: 0.1,
            max_latency_ms: None,
            max_memory_mb: 50,
            min_calibration_samples: 100,
            validation_fraction: 0.2,
            tiling: TilingConfig::default(),
        }
    }
}

impl QuantizationConfig {
    /// Stricter thresholds, KL calibration and a shadow check on every inference.
    #[must_use]
    pub fn high_precision() -> Self {
        Self {
            calibration_strategy: CalibrationStrategy::Kl,
            warning_threshold: 0.99,
            fallback_threshold: 0.98,
            shadow_sample_rate: 1.0,
            ..Self::default()
        }
    }

    /// Looser thresholds, rare shadow checks and a latency ceiling.
    #[must_use]
    pub fn high_performance() -> Self {
        Self {
            warning_threshold: 0.95,
            fallback_threshold: 0.90,
            shadow_sample_rate: 0.01,
            max_latency_ms: Some(5),
            ..Self::default()
        }
    }

    /// Never accepts an int8 model.
    #[must_use]
    pub fn fp32_only() -> Self {
        Self {
            warning_threshold: 1.0,
            fallback_threshold: 1.0,
            enable_auto_fallback: false,
            ..Self::default()
        }
    }

    /// Memory budget in bytes.
    #[must_use]
    pub fn memory_budget_bytes(&self) -> u64 {
        self.max_memory_mb as u64 * 1024 * 1024
    }

    /// Checks every field for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.fallback_threshold) || !unit.contains(&self.warning_threshold) {
            return Err(invalid("thresholds must be within [0, 1]"));
        }
        if self.fallback_threshold > self.warning_threshold {
            return Err(invalid(format!(
                "fallback_threshold ({}) must not exceed warning_threshold ({})",
                self.fallback_threshold, self.warning_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.shadow_sample_rate) {
            return Err(invalid("shadow_sample_rate must be within [0, 1]"));
        }
        if !(self.percentile > 0.0 && self.percentile <= 1.0) {
            return Err(invalid("percentile must be within (0, 1]"));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(invalid("validation_fraction must be within (0, 1)"));
        }
        if !(2..=10_000).contains(&self.min_calibration_samples) {
            return Err(invalid("min_calibration_samples must be within 2..=10000"));
        }
        if self.max_memory_mb == 0 {
            return Err(invalid("max_memory_mb must be > 0"));
        }
        if self.max_latency_ms == Some(0) {
            return Err(invalid("max_latency_ms must be > 0 when set"));
        }
        if self.tiling.block_size == 0 || self.tiling.max_concurrent_blocks == 0 {
            return Err(invalid(
                "tiling block_size and max_concurrent_blocks must be > 0",
            ));
        }
        Ok(())
    }
}

/// Query orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// `top_k` used when a request does not set one.
    pub default_top_k: usize,
    /// Upper bound applied to every request's `top_k`.
    pub max_top_k: usize,
    /// Minimum similarity score used when a request does not set one.
    pub default_threshold: f32,
    /// Deadline used when a request does not set one.
    pub default_timeout_ms: u64,
    /// Query-time beam width.
    pub ef_search: usize,
    /// Worker threads executing queries.
    pub worker_threads: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 20,
            default_threshold: 0.5,
            default_timeout_ms: 2_000,
            ef_search: 64,
            worker_threads: 4,
        }
    }
}

impl QueryConfig {
    /// Default deadline as a `Duration`.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Checks every field for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.max_top_k) {
            return Err(invalid("max_top_k must be within 1..=100"));
        }
        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(invalid("default_top_k must be within 1..=max_top_k"));
        }
        if self.default_timeout_ms == 0 {
            return Err(invalid("default_timeout_ms must be > 0"));
        }
        if self.ef_search == 0 || self.worker_threads == 0 {
            return Err(invalid("ef_search and worker_threads must be > 0"));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `lodestar_core=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LodestarConfig {
    /// Loads defaults, then `lodestar.toml` if present, then environment overrides.
    pub fn load() -> Result<Self> {
        Self::extract(Self::base().merge(Toml::file(CONFIG_FILE)))
    }

    /// Loads defaults, then `path`, then environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if `path` does not exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file not found: {}", path.display()),
            )));
        }
        Self::extract(Self::base().merge(Toml::file(path)))
    }

    /// Parses a TOML document on top of the defaults (no environment).
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| invalid(e.to_string()))
    }

    /// Validates all sections.
    pub fn validate(&self) -> Result<()> {
        self.index.params().validate()?;
        self.quantization.validate()?;
        self.query.validate()
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig(message.into())
}
