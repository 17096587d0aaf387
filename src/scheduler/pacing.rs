//! Request pacing against the upstream generation service.
//!
//! Two independent mechanisms:
//! - **Attempt backoff**: a randomized wait before every attempt of a task, shorter for the
//!   first few attempts of fast tasks, occasionally much longer on a first slow attempt.
//! - **Session throttle**: after a randomized number of successful attempts the scheduler
//!   takes one long randomized pause, whatever the per-attempt backoff did.
//!
//! All numbers are heuristics tuned against the vendor and are injected through config.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Pacing configuration. Durations are milliseconds; each randomized value is drawn
/// uniformly from `[min, min + spread)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Fixed wait before the first attempt of a fast task.
    pub fast_first_delay_ms: u64,
    /// Attempts after the first that still use the short fast delay.
    pub fast_short_attempts: u32,
    pub fast_delay_min_ms: u64,
    pub fast_delay_spread_ms: u64,
    /// Regular delay before attempts of slow tasks and late attempts of fast ones.
    pub delay_min_ms: u64,
    pub delay_spread_ms: u64,
    /// Chance that a slow task's first attempt waits an outlier delay instead.
    pub outlier_probability: f64,
    pub outlier_min_ms: u64,
    pub outlier_spread_ms: u64,
    /// Session throttle pause length.
    pub long_pause_min_ms: u64,
    pub long_pause_spread_ms: u64,
    /// Successful attempts between session throttle pauses.
    pub long_pause_interval_min: u32,
    pub long_pause_interval_spread: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            fast_first_delay_ms: 1_000,
            fast_short_attempts: 2,
            fast_delay_min_ms: 1_000,
            fast_delay_spread_ms: 3_000,
            delay_min_ms: 6_000,
            delay_spread_ms: 3_000,
            outlier_probability: 0.02,
            outlier_min_ms: 12_000,
            outlier_spread_ms: 6_000,
            long_pause_min_ms: 300_000,
            long_pause_spread_ms: 150_000,
            long_pause_interval_min: 500,
            long_pause_interval_spread: 100,
        }
    }
}

fn uniform_ms<R: Rng + ?Sized>(rng: &mut R, min_ms: u64, spread_ms: u64) -> Duration {
    let jitter = if spread_ms == 0 { 0 } else { rng.random_range(0..spread_ms) };
    Duration::from_millis(min_ms + jitter)
}

impl PacingConfig {
    /// No waiting at all; session throttle effectively never fires.
    pub fn immediate() -> Self {
        Self {
            fast_first_delay_ms: 0,
            fast_short_attempts: 0,
            fast_delay_min_ms: 0,
            fast_delay_spread_ms: 0,
            delay_min_ms: 0,
            delay_spread_ms: 0,
            outlier_probability: 0.0,
            outlier_min_ms: 0,
            outlier_spread_ms: 0,
            long_pause_min_ms: 0,
            long_pause_spread_ms: 0,
            long_pause_interval_min: u32::MAX,
            long_pause_interval_spread: 0,
        }
    }

    /// Backoff before attempt `attempt` (0-based).
    pub fn attempt_delay(&self, attempt: u32, fast: bool) -> Duration {
        self.attempt_delay_with(&mut rand::rng(), attempt, fast)
    }

    pub fn attempt_delay_with<R: Rng + ?Sized>(&self, rng: &mut R, attempt: u32, fast: bool) -> Duration {
        if fast && attempt == 0 {
            return Duration::from_millis(self.fast_first_delay_ms);
        }
        if fast && attempt <= self.fast_short_attempts {
            return uniform_ms(rng, self.fast_delay_min_ms, self.fast_delay_spread_ms);
        }
        if attempt == 0 && self.outlier_probability > 0.0 && rng.random_bool(self.outlier_probability.min(1.0)) {
            return uniform_ms(rng, self.outlier_min_ms, self.outlier_spread_ms);
        }
        uniform_ms(rng, self.delay_min_ms, self.delay_spread_ms)
    }

    /// Length of one session throttle pause.
    pub fn long_pause(&self) -> Duration {
        uniform_ms(&mut rand::rng(), self.long_pause_min_ms, self.long_pause_spread_ms)
    }

    /// Successful attempts until the next session throttle pause. Never zero.
    pub fn long_pause_interval(&self) -> u32 {
        self.long_pause_interval_with(&mut rand::rng())
    }

    pub fn long_pause_interval_with<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        let jitter = if self.long_pause_interval_spread == 0 {
            0
        } else {
            rng.random_range(0..self.long_pause_interval_spread)
        };
        self.long_pause_interval_min.saturating_add(jitter).max(1)
    }
}

/// Attempt counts per handler family.
///
/// Remote generation is retried many times; the local background remover gets one try.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub generation: u32,
    pub remove_background: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            generation: 40,
            remove_background: 1,
        }
    }
}
