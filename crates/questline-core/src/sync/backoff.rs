//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry schedule for transient sync failures.
///
/// The delay before retry `n` (0-based) is
/// `min(base_delay * multiplier^n, max_delay)` plus up to `jitter_ratio` of
/// that value drawn uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Total attempts per event, including the first
    pub max_attempts: u32,
    pub jitter_ratio: f64,
}

impl BackoffPolicy {
    /// Policy with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            max_attempts,
            jitter_ratio: 0.0,
        }
    }

    /// Delay before the capped exponential step, without jitter.
    pub fn base_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(63) as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    pub fn delay_for<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let base = self.base_for(retry);
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        if ratio == 0.0 || base.is_zero() {
            return base;
        }
        let jitter_ms = (base.as_millis() as f64 * ratio) as u64;
        base + Duration::from_millis(rng.gen_range(0..=jitter_ms))
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter_ratio: 0.1,
        }
    }
}
