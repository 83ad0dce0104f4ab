//! Timing Policy (C1): pure, stateless retransmit/backoff/keepalive math.
//!
//! The backoff schedule (≈4, 7, 13, 23, 42, 76 s; total ≈165 s) is load
//! bearing: it is what makes a peer "dead after six unanswered probes,
//! ≈2 min 45 s". Do not change `RETRANSMIT_BASE`/`RETRANSMIT_TRIES`
//! independently of each other without re-checking that schedule.

use std::time::Duration;

use rand::Rng;

use crate::constants::{
    HALF_OPEN_IKE_SA_TIMEOUT, INITIAL_RETRANSMIT_TIMEOUT, KEEPALIVE_INTERVAL, RETRANSMIT_BASE,
    RETRANSMIT_TRIES, RETRY_BASE_INTERVAL, RETRY_JITTER,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct TimingPolicy;

impl TimingPolicy {
    /// Returns the retransmit timeout for the `try_count`th attempt
    /// (0-indexed), or `None` once the retransmit budget is exhausted.
    ///
    /// ```
    /// use ike_core::timing::TimingPolicy;
    /// use std::time::Duration;
    ///
    /// let p = TimingPolicy;
    /// assert_eq!(p.retransmit_timeout(0), Some(Duration::from_millis(4000)));
    /// assert_eq!(p.retransmit_timeout(5), Some(Duration::from_millis(75582)));
    /// assert_eq!(p.retransmit_timeout(6), None);
    /// ```
    pub fn retransmit_timeout(&self, try_count: u32) -> Option<Duration> {
        if try_count > RETRANSMIT_TRIES {
            return None;
        }

        let millis = INITIAL_RETRANSMIT_TIMEOUT.as_millis() as f64
            * RETRANSMIT_BASE.powi(try_count as i32);
        Some(Duration::from_millis(millis.round() as u64))
    }

    pub fn half_open_ike_sa_timeout(&self) -> Duration {
        HALF_OPEN_IKE_SA_TIMEOUT
    }

    pub fn keepalive_interval(&self) -> Duration {
        KEEPALIVE_INTERVAL
    }

    /// `retry_base_interval - uniform(0, retry_jitter)`, used to decorrelate
    /// synchronized retries across many sessions after a soft failure.
    pub fn retry_interval(&self) -> Duration {
        let jitter_ms = RETRY_JITTER.as_millis() as u64;
        let subtracted = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };

        RETRY_BASE_INTERVAL
            .checked_sub(Duration::from_millis(subtracted))
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retransmit_schedule_matches_spec() {
        let p = TimingPolicy;
        let expected_secs = [4.0, 7.2, 12.96, 23.328, 41.99, 75.58];

        for (try_count, expected) in expected_secs.iter().enumerate() {
            let got = p.retransmit_timeout(try_count as u32).unwrap();
            let delta = (got.as_secs_f64() - expected).abs();
            assert!(delta < 0.1, "try {try_count}: got {got:?}, want ~{expected}s");
        }

        assert_eq!(p.retransmit_timeout(6), None);
    }

    #[test]
    fn retransmit_total_budget_is_about_165_seconds() {
        let p = TimingPolicy;
        let total: Duration = (0..=5).map(|t| p.retransmit_timeout(t).unwrap()).sum();
        assert!((total.as_secs_f64() - 165.0).abs() < 5.0);
    }

    #[test]
    fn retry_interval_is_bounded() {
        let p = TimingPolicy;
        for _ in 0..100 {
            let d = p.retry_interval();
            assert!(d <= RETRY_BASE_INTERVAL);
            assert!(d >= RETRY_BASE_INTERVAL - RETRY_JITTER);
        }
    }
}
