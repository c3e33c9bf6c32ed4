//! Per-connection tunables.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::segment::MAX_PAYLOAD;

/// Adjustable protocol parameters.  [`Config::default`] matches the classic
/// STCP assignment values (536-byte MSS, 3072-byte window).
#[derive(Debug, Clone)]
pub struct Config {
    /// Largest payload placed in one segment (clamped to [`MAX_PAYLOAD`]).
    pub mss: usize,
    /// Receive window advertised in every outgoing segment.
    pub local_window: u16,
    /// Fixed congestion window; the usable send window never exceeds it.
    pub congestion_window: u32,
    /// Retransmission timeout before any RTT sample is available.
    pub initial_rto: Duration,
    /// Lower bound for the RTO computed from RTT samples.
    pub min_rto: Duration,
    /// Upper bound for the backed-off RTO.
    pub max_rto: Duration,
    /// Consecutive retransmissions of one segment before giving up.
    pub max_retries: u32,
    /// Bound on the wait for the peer to finish closing once any FIN has
    /// been sent or received.
    pub close_timeout: Duration,
    /// Linger after the final ACK of an active close.
    pub time_wait: Duration,
    /// Range initial sequence numbers are drawn from.
    pub isn_range: RangeInclusive<u32>,
    /// Seed for initial sequence numbers; `None` draws from the thread RNG.
    pub isn_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mss: MAX_PAYLOAD,
            local_window: 3072,
            congestion_window: 3072,
            initial_rto: Duration::from_millis(1000),
            min_rto: Duration::from_millis(200),
            max_rto: Duration::from_secs(60),
            max_retries: 6,
            close_timeout: Duration::from_secs(10),
            time_wait: Duration::from_secs(1),
            isn_range: 0..=u32::MAX,
            isn_seed: None,
        }
    }
}

impl Config {
    /// Effective MSS: never zero, never above [`MAX_PAYLOAD`].
    pub fn effective_mss(&self) -> usize {
        self.mss.clamp(1, MAX_PAYLOAD)
    }

    /// Draw an initial sequence number from [`Config::isn_range`].
    pub fn initial_sequence_number(&self) -> u32 {
        match self.isn_seed {
            Some(seed) => StdRng::seed_from_u64(seed).random_range(self.isn_range.clone()),
            None => rand::rng().random_range(self.isn_range.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_isn_is_deterministic_and_in_range() {
        let config = Config {
            isn_range: 100..=255,
            isn_seed: Some(7),
            ..Config::default()
        };
        let a = config.initial_sequence_number();
        let b = config.initial_sequence_number();
        assert_eq!(a, b);
        assert!((100..=255).contains(&a));
    }

    #[test]
    fn single_value_range_is_fixed() {
        let config = Config {
            isn_range: 1..=1,
            ..Config::default()
        };
        assert_eq!(config.initial_sequence_number(), 1);
    }

    #[test]
    fn mss_is_clamped() {
        let config = Config {
            mss: 10_000,
            ..Config::default()
        };
        assert_eq!(config.effective_mss(), MAX_PAYLOAD);
        let config = Config {
            mss: 0,
            ..Config::default()
        };
        assert_eq!(config.effective_mss(), 1);
    }
}
