use std::time::Duration;

use crate::config::LlmConfig;

/// Exponential backoff between model call attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Fraction of the delay added or removed at random, 0.0 to 1.0.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(cfg: &LlmConfig) -> Self {
        Self {
            base: Duration::from_millis(cfg.retry_base_ms),
            multiplier: cfg.retry_multiplier,
            max_delay: Duration::from_millis(cfg.retry_max_delay_ms),
            jitter: cfg.retry_jitter,
        }
    }

    /// Delay before retry number `retry` (0 for the first retry), without
    /// jitter: `base * multiplier^retry`, capped at `max_delay`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let cap = self.max_delay.as_secs_f64();
        let factor = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let secs = self.base.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= cap {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// [`Self::base_delay`] moved by up to `±jitter` of itself, then clamped
    /// back under `max_delay`.
    pub fn delay_with_jitter(&self, retry: u32, rng: &mut fastrand::Rng) -> Duration {
        let base = self.base_delay(retry).as_secs_f64();
        let jitter = self.jitter.clamp(0.0, 1.0);
        let offset = (rng.f64() * 2.0 - 1.0) * jitter * base;
        let secs = (base + offset).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}
