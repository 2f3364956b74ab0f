//! Retry backoff policy for the dispatcher
//!
//! The core never retries on its own; the dispatcher consults this policy to
//! decide whether a failed entry is due for another attempt.

use std::time::Duration;

use rand::Rng;

use super::SyncQueueEntry;

/// Exponential backoff with jitter, capped.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    /// Fractional jitter applied to each delay, e.g. 0.2 for ±20%
    jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            cap: Duration::from_secs(15 * 60),
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        Self {
            base,
            cap,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay before the attempt following `retry_count` failures.
    ///
    /// Doubles per failure from `base` up to `cap`, then spreads by the
    /// jitter fraction so a burst of failures does not retry in lockstep.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exp = retry_count.min(16);
        let raw = self
            .base
            .saturating_mul(2_u32.saturating_pow(exp))
            .min(self.cap);

        if self.jitter == 0.0 {
            return raw;
        }

        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        let jittered = raw.as_secs_f64() * (1.0 + spread);
        Duration::from_secs_f64(jittered.max(0.0)).min(self.cap)
    }

    /// Whether a queue entry is due for another attempt at `now_ms`.
    ///
    /// Entries that have never been attempted are always due.
    pub fn is_due(&self, entry: &SyncQueueEntry, now_ms: i64) -> bool {
        let Some(last_attempt) = entry.last_attempt_at else {
            return true;
        };

        let retries = u32::try_from(entry.retry_count.max(0)).unwrap_or(u32::MAX);
        // retry_count was already bumped for the attempt that just failed
        let delay = self.delay_for(retries.saturating_sub(1));
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);

        now_ms >= last_attempt.saturating_add(delay_ms)
    }
}
