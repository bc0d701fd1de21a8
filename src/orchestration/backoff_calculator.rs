//! # Backoff Calculator
//!
//! Exponential delay between retries of a failed task, capped and optionally
//! jittered so that many processes failing against the same resource do not
//! retry in lockstep.

use crate::config::BackoffConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

/// Delay chosen for one retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffResult {
    pub delay_ms: u64,
    /// Retry number the delay applies to, starting at 1
    pub retry: u32,
    pub next_retry_at: DateTime<Utc>,
}

impl BackoffResult {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn is_immediate(&self) -> bool {
        self.delay_ms == 0
    }
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `retry` (1 for the first retry)
    ///
    /// `base * multiplier^(retry - 1)`, capped at the configured maximum
    pub fn calculate(&self, retry: u32) -> BackoffResult {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential = self.config.base_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let mut delay_ms = exponential.min(self.config.max_delay_ms as f64) as u64;

        if self.config.jitter_enabled {
            delay_ms = self.apply_jitter(delay_ms);
        }

        BackoffResult {
            delay_ms,
            retry,
            next_retry_at: Utc::now() + chrono::Duration::milliseconds(delay_ms as i64),
        }
    }

    fn apply_jitter(&self, delay_ms: u64) -> u64 {
        use rand::Rng;

        let jitter_range = (delay_ms as f64 * self.config.max_jitter) as u64;
        if jitter_range == 0 {
            return delay_ms;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(0..=jitter_range);

        if rng.gen_bool(0.5) {
            delay_ms.saturating_add(jitter)
        } else {
            delay_ms.saturating_sub(jitter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jitter_enabled: bool) -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            jitter_enabled,
            max_jitter: 0.1,
        }
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let calculator = BackoffCalculator::new(config(false));
        let delays: Vec<u64> = (1..=6).map(|r| calculator.calculate(r).delay_ms).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let calculator = BackoffCalculator::new(config(true));
        for _ in 0..100 {
            let delay = calculator.calculate(3).delay_ms;
            assert!((360..=440).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_zero_base_is_immediate() {
        let calculator = BackoffCalculator::new(BackoffConfig {
            base_delay_ms: 0,
            ..config(true)
        });
        assert!(calculator.calculate(4).is_immediate());
    }
}
