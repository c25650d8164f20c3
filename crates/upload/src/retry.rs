//! Retry bound and backoff policy for upload tasks.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Delay strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// `initial * factor^(attempt-1)`, capped at `max`, with ±25% jitter.
    Exponential {
        initial_ms: u64,
        max_ms: u64,
        factor: f64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed { delay_ms: 2000 }
    }
}

/// How many times a task may retry and how long it waits in between.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits. Handy for tests and for local endpoints.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::None,
        }
    }

    /// Whether a task that has already retried `attempts` times may retry again.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_retries
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential {
                initial_ms,
                max_ms,
                factor,
            } => {
                let exp = attempt.saturating_sub(1).min(63) as i32;
                let ms = initial_ms as f64 * factor.max(1.0).powi(exp);
                let capped = ms.min(max_ms as f64);
                let jitter = capped * 0.25 * rand::thread_rng().gen_range(-1.0..1.0);
                Duration::from_millis((capped + jitter).max(0.0) as u64)
            }
        }
    }
}
