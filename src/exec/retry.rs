// src/exec/retry.rs

//! Retry policy and exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::model::{RetryConfig, parse_duration};

/// How often a task may be attempted and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always >= 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the un-jittered delay.
    pub max_backoff: Duration,
    /// Growth factor applied per failed attempt.
    pub multiplier: f64,
    /// Fraction of the delay added as random jitter (0.0 ..= 1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` attempts and no waiting in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Build a policy from config, using defaults for unset fields.
    pub fn from_config(cfg: &RetryConfig) -> Result<Self, String> {
        let defaults = RetryPolicy::default();

        let max_attempts = cfg.max_attempts.unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err("retry.max_attempts must be >= 1 (got 0)".to_string());
        }

        let initial_backoff = match cfg.initial_backoff.as_deref() {
            Some(s) => parse_duration(s)?,
            None => defaults.initial_backoff,
        };
        let max_backoff = match cfg.max_backoff.as_deref() {
            Some(s) => parse_duration(s)?,
            None => defaults.max_backoff.max(initial_backoff),
        };

        let multiplier = cfg.multiplier.unwrap_or(defaults.multiplier);
        if !(multiplier >= 1.0) {
            return Err(format!("retry.multiplier must be >= 1.0 (got {multiplier})"));
        }

        let jitter = cfg.jitter.unwrap_or(defaults.jitter);
        if !(0.0..=1.0).contains(&jitter) {
            return Err(format!("retry.jitter must be within 0.0..=1.0 (got {jitter})"));
        }

        Ok(Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            multiplier,
            jitter,
        })
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Un-jittered delay after the given failed attempt (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31) as i32;
        let nanos = self.initial_backoff.as_nanos() as f64 * self.multiplier.powi(exp);
        let capped = nanos.min(self.max_backoff.as_nanos() as f64);
        Duration::from_nanos(capped.max(0.0).round() as u64)
    }

    /// Delay after the given failed attempt, including random jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.0..=self.jitter);
        base + base.mul_f64(factor)
    }
}
