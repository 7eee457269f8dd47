//! Bounded retry with backoff and a per-attempt timeout.

use crate::{PlotwatchError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the given zero-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt);
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(10),
            },
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            timeout,
        }
    }

    /// Runs `op` until it succeeds or the attempts run out, returning the last
    /// error. Each attempt is bounded by the policy timeout.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_paced(label, || async {}, move |()| op()).await
    }

    /// Like [`RetryPolicy::run`], but awaits `pace` before every attempt and
    /// hands its output to `op`. Time spent in `pace` does not count against
    /// the attempt timeout.
    pub async fn run_paced<T, G, P, PFut, F, Fut>(&self, label: &str, mut pace: P, mut op: F) -> Result<T>
    where
        P: FnMut() -> PFut,
        PFut: Future<Output = G>,
        F: FnMut(G) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            let turn = pace().await;
            let outcome = match tokio::time::timeout(self.timeout, op(turn)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(PlotwatchError::Timeout(self.timeout)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("{} failed ({}/{}): {}", label, attempt + 1, attempts, e);
                    last_error = Some(e);
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.backoff.delay(attempt)).await;
            }
        }

        Err(last_error.unwrap_or(PlotwatchError::Timeout(Duration::ZERO)))
    }
}
