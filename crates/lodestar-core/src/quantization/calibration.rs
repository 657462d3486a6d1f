//! Activation range calibration.
//!
//! A first pass over the calibration activations collects [`CalibrationStats`];
//! a second pass fills an [`AbsHistogram`] of `|x|` over `[0, absmax]` when
//! the strategy clips outliers. The resulting range feeds
//! [`ActivationParams::from_range`].

use super::tensor::ActivationParams;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Histogram resolution used by the `kl` and `percentile` strategies.
pub const HISTOGRAM_BINS: usize = 2048;

/// Quantization levels the KL search compresses the histogram into.
pub const KL_TARGET_BINS: usize = 128;

/// How the activation range is derived from calibration data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStrategy {
    /// Observed minimum and maximum.
    #[default]
    #[serde(alias = "minmax")]
    MinMax,
    /// Clip threshold minimizing the KL divergence between the reference
    /// histogram and its 128-level quantization.
    Kl,
    /// Clip threshold at a percentile of `|x|`.
    Percentile,
}

impl fmt::Display for CalibrationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MinMax => "min_max",
            Self::Kl => "kl",
            Self::Percentile => "percentile",
        })
    }
}

impl FromStr for CalibrationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "min_max" | "minmax" => Ok(Self::MinMax),
            "kl" => Ok(Self::Kl),
            "percentile" => Ok(Self::Percentile),
            other => Err(format!("unknown calibration strategy '{other}'")),
        }
    }
}

/// Running statistics of calibration values (Welford).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationStats {
    /// Number of values observed.
    pub count: u64,
    /// Smallest value.
    pub min: f32,
    /// Largest value.
    pub max: f32,
    /// Mean value.
    pub mean: f64,
    m2: f64,
}

impl Default for CalibrationStats {
    fn default() -> Self {
        Self {
            count: 0,
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            mean: 0.0,
            m2: 0.0,
        }
    }
}

impl CalibrationStats {
    /// Statistics over every value of every sample.
    #[must_use]
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a [f32]>) -> Self {
        let mut stats = Self::default();
        for sample in samples {
            stats.observe(sample);
        }
        stats
    }

    /// Folds a batch of values into the statistics.
    pub fn observe(&mut self, values: &[f32]) {
        for &v in values {
            self.count += 1;
            self.min = self.min.min(v);
            self.max = self.max.max(v);
            let x = f64::from(v);
            let delta = x - self.mean;
            #[allow(clippy::cast_precision_loss)]
            let n = self.count as f64;
            self.mean += delta / n;
            self.m2 += delta * (x - self.mean);
        }
    }

    /// Population standard deviation.
    #[must_use]
    pub fn std(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.count as f64;
        (self.m2 / n).sqrt()
    }

    /// Largest magnitude observed.
    #[must_use]
    pub fn absmax(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        self.min.abs().max(self.max.abs())
    }

    /// True if at least `required` values were observed.
    #[must_use]
    pub fn is_sufficient(&self, required: u64) -> bool {
        self.count >= required
    }
}

/// Fixed-width histogram of `|x|` over `[0, absmax]`.
#[derive(Debug, Clone)]
pub struct AbsHistogram {
    bins: Vec<u64>,
    width: f32,
}

impl AbsHistogram {
    /// Empty histogram with `bins` bins spanning `[0, absmax]`.
    #[must_use]
    pub fn new(absmax: f32, bins: usize) -> Self {
        let bins = bins.max(1);
        #[allow(clippy::cast_precision_loss)]
        let width = if absmax > 0.0 && absmax.is_finite() {
            absmax / bins as f32
        } else {
            0.0
        };
        Self {
            bins: vec![0; bins],
            width,
        }
    }

    /// Adds values; magnitudes above `absmax` land in the last bin.
    pub fn add(&mut self, values: &[f32]) {
        let last = self.bins.len() - 1;
        for &v in values {
            let idx = if self.width > 0.0 {
                // SAFETY: non-negative and capped at the last bin.
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let i = (v.abs() / self.width) as usize;
                i.min(last)
            } else {
                0
            };
            self.bins[idx] += 1;
        }
    }

    /// Total number of values recorded.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.bins.iter().sum()
    }

    /// Bin counts.
    #[must_use]
    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    /// Smallest threshold below which a fraction `p` of the magnitudes lie.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percentile_threshold(&self, p: f64) -> f32 {
        let total = self.total();
        if total == 0 || self.width == 0.0 {
            return 0.0;
        }
        let target = p.clamp(0.0, 1.0) * total as f64;
        let mut seen = 0_u64;
        for (i, &count) in self.bins.iter().enumerate() {
            seen += count;
            if seen as f64 >= target {
                return (i + 1) as f32 * self.width;
            }
        }
        self.bins.len() as f32 * self.width
    }

    /// Clip threshold minimizing `KL(P || Q)`, where `P` is the histogram
    /// truncated at the candidate threshold with the clipped mass folded into
    /// its last bin, and `Q` is `P` compressed into `target_bins` levels and
    /// expanded back.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn kl_threshold(&self, target_bins: usize) -> f32 {
        let n = self.bins.len();
        if self.total() == 0 || self.width == 0.0 {
            return 0.0;
        }
        let target_bins = target_bins.clamp(1, n);
        let mut best = (f64::INFINITY, n);

        for i in target_bins..=n {
            let mut reference: Vec<f64> = self.bins[..i].iter().map(|&c| c as f64).collect();
            let outliers: u64 = self.bins[i..].iter().sum();
            reference[i - 1] += outliers as f64;
            let candidate = expand_quantized(&self.bins[..i], target_bins);
            let divergence = kl_divergence(&reference, &candidate);
            if divergence < best.0 {
                best = (divergence, i);
            }
        }

        let threshold = (best.1 as f32 + 0.5) * self.width;
        tracing::debug!(threshold, kl = best.0, bins = best.1, "kl calibration threshold");
        threshold
    }
}

/// Merges `bins` into `levels` groups and spreads each group's mass evenly
/// over its non-empty bins.
#[allow(clippy::cast_precision_loss)]
fn expand_quantized(bins: &[u64], levels: usize) -> Vec<f64> {
    let n = bins.len();
    let mut expanded = vec![0.0; n];
    for level in 0..levels {
        let start = level * n / levels;
        let end = if level + 1 == levels {
            n
        } else {
            (level + 1) * n / levels
        };
        let group = &bins[start..end];
        let non_empty = group.iter().filter(|&&c| c > 0).count();
        if non_empty == 0 {
            continue;
        }
        let share = group.iter().sum::<u64>() as f64 / non_empty as f64;
        for (slot, &count) in expanded[start..end].iter_mut().zip(group) {
            if count > 0 {
                *slot = share;
            }
        }
    }
    expanded
}

fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    const EPSILON: f64 = 1e-10;
    let p_total: f64 = p.iter().sum();
    let q_total: f64 = q.iter().sum();
    if p_total == 0.0 || q_total == 0.0 {
        return f64::INFINITY;
    }
    p.iter()
        .zip(q)
        .filter(|(&pi, _)| pi > 0.0)
        .map(|(&pi, &qi)| {
            let pn = pi / p_total;
            let qn = (qi / q_total).max(EPSILON);
            pn * (pn / qn).ln()
        })
        .sum()
}

/// Derives activation parameters from calibration samples.
///
/// `percentile` is only used by [`CalibrationStrategy::Percentile`].
#[must_use]
pub fn calibrate(samples: &[&[f32]], strategy: CalibrationStrategy, percentile: f64) -> ActivationParams {
    let stats = CalibrationStats::from_samples(samples.iter().copied());
    if stats.count == 0 {
        return ActivationParams::from_range(0.0, 0.0);
    }
    let (min, max) = match strategy {
        CalibrationStrategy::MinMax => (stats.min, stats.max),
        CalibrationStrategy::Kl | CalibrationStrategy::Percentile => {
            let mut histogram = AbsHistogram::new(stats.absmax(), HISTOGRAM_BINS);
            for sample in samples {
                histogram.add(sample);
            }
            let threshold = if strategy == CalibrationStrategy::Kl {
                histogram.kl_threshold(KL_TARGET_BINS)
            } else {
                histogram.percentile_threshold(percentile)
            };
            (stats.min.max(-threshold), stats.max.min(threshold))
        }
    };
    ActivationParams::from_range(min, max)
}
