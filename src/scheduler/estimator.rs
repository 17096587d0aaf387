//! Rolling per-type duration estimates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::pacing::PacingConfig;

/// Which statistic to report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateKind {
    #[default]
    Median,
    Mean,
}

/// Fixed-size ring of recent attempt durations.
///
/// Falls back to `default_estimate` until the first sample arrives.
#[derive(Debug, Clone)]
pub struct TimeEstimator {
    samples: Vec<Option<Duration>>,
    cursor: usize,
    default_estimate: Duration,
}

impl TimeEstimator {
    pub fn new(max_samples: usize, default_estimate: Duration) -> Self {
        Self {
            samples: vec![None; max_samples.max(1)],
            cursor: 0,
            default_estimate,
        }
    }

    /// Record a sample, overwriting the oldest once the window is full.
    pub fn add_sample(&mut self, sample: Duration) {
        self.samples[self.cursor] = Some(sample);
        self.cursor = (self.cursor + 1) % self.samples.len();
    }

    pub fn sample_count(&self) -> usize {
        self.samples.iter().flatten().count()
    }

    pub fn default_estimate(&self) -> Duration {
        self.default_estimate
    }

    /// Upper-middle element of the sorted window.
    pub fn estimate_median(&self) -> Duration {
        let mut sorted: Vec<Duration> = self.samples.iter().flatten().copied().collect();
        if sorted.is_empty() {
            return self.default_estimate;
        }
        sorted.sort_unstable();
        sorted[sorted.len() / 2]
    }

    pub fn estimate_mean(&self) -> Duration {
        let count = self.sample_count() as u32;
        if count == 0 {
            return self.default_estimate;
        }
        self.samples.iter().flatten().sum::<Duration>() / count
    }

    pub fn estimate(&self, kind: EstimateKind) -> Duration {
        match kind {
            EstimateKind::Median => self.estimate_median(),
            EstimateKind::Mean => self.estimate_mean(),
        }
    }
}

/// Estimator window sizes and the estimate used before any sample exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub samples: usize,
    pub fast_samples: usize,
    pub default_estimate_ms: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            samples: 128,
            fast_samples: 16,
            default_estimate_ms: 22_000,
        }
    }
}

impl EstimatorConfig {
    pub fn create(&self) -> TimeEstimator {
        TimeEstimator::new(self.samples, Duration::from_millis(self.default_estimate_ms))
    }

    /// Fast tasks skip the mean regular delay and wait the fixed first delay instead.
    pub fn create_fast(&self, pacing: &PacingConfig) -> TimeEstimator {
        let estimate = self
            .default_estimate_ms
            .saturating_sub(pacing.delay_min_ms + pacing.delay_spread_ms / 2)
            .saturating_add(pacing.fast_first_delay_ms);
        TimeEstimator::new(self.fast_samples, Duration::from_millis(estimate))
    }
}
