use std::time::Duration;

use rand::Rng;

/// Retry parameters captured once per call from the configuration snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Option<Duration>,
}

impl RetryBudget {
    pub(crate) const fn new(
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Option<Duration>,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    /// Validated constructor for per-request overrides; configuration-sourced
    /// budgets go through `ClientConfig::validate` instead.
    pub fn try_new(
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Option<Duration>,
    ) -> Result<Self, crate::error::Error> {
        if initial_backoff.is_zero() {
            return Err(crate::error::Error::InvalidConfig {
                message: "initial backoff must be greater than zero".to_owned(),
            });
        }
        if let Some(max_backoff) = max_backoff {
            if max_backoff < initial_backoff {
                return Err(crate::error::Error::InvalidConfig {
                    message: format!(
                        "max backoff {max_backoff:?} must be >= initial backoff {initial_backoff:?}"
                    ),
                });
            }
        }
        Ok(Self::new(max_retries, initial_backoff, max_backoff))
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    pub fn max_backoff(&self) -> Option<Duration> {
        self.max_backoff
    }

    /// Upper bound of the jittered delay before `attempt`:
    /// `min(initial_backoff * 2^attempt, max_backoff)`, saturating.
    pub(crate) fn delay_upper_bound(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.min(31) as u32;
        let multiplier = 1_u128 << exponent;
        let initial_ms = self.initial_backoff.as_millis().max(1);
        let mut delay_ms = initial_ms.saturating_mul(multiplier);
        if let Some(max_backoff) = self.max_backoff {
            delay_ms = delay_ms.min(max_backoff.as_millis());
        }
        Duration::from_millis(delay_ms.min(u64::MAX as u128) as u64)
    }
}

/// Full-jitter delay before `attempt`: uniform in `[0, upper_bound]`.
/// Attempt 0 is the initial call and waits nothing. Randomizing the whole
/// range keeps concurrent callers from retrying against the same degraded
/// endpoint in lockstep.
pub(crate) fn delay_for(attempt: usize, budget: &RetryBudget) -> Duration {
    let upper = budget.delay_upper_bound(attempt);
    if upper.is_zero() {
        return Duration::ZERO;
    }
    let upper_ms = upper.as_millis().min(u64::MAX as u128) as u64;
    let mut rng = rand::rng();
    Duration::from_millis(rng.random_range(0..=upper_ms))
}
