//! Retransmission timer management.
//!
//! Reliable delivery requires that unacknowledged segments are re-sent if no
//! ACK arrives within a bounded time.  [`RetransmitTimer`] owns the
//! retransmission deadline the engine hands to
//! [`crate::host::Host::wait_for_event`], plus the retry counter that bounds
//! how long we keep trying.
//!
//! RTO is computed using Jacobson's algorithm (RFC 6298):
//!   `RTO = SRTT + 4 × RTTVAR`
//! and doubles on each consecutive timeout (exponential back-off) up to a
//! configurable maximum.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::Config;

/// The retransmission timer for one connection.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    initial_rto: Duration,
    min_rto: Duration,
    max_rto: Duration,
    /// Current RTO, updated after each RTT sample and each back-off.
    pub current_rto: Duration,
    /// Smoothed RTT estimate (SRTT).
    pub srtt: Option<Duration>,
    /// RTT variance estimate (RTTVAR).
    pub rttvar: Option<Duration>,
    deadline: Option<Instant>,
    retries: u32,
}

impl RetransmitTimer {
    pub fn new(config: &Config) -> Self {
        Self {
            initial_rto: config.initial_rto,
            min_rto: config.min_rto,
            max_rto: config.max_rto,
            current_rto: config.initial_rto,
            srtt: None,
            rttvar: None,
            deadline: None,
            retries: 0,
        }
    }

    /// Record a new RTT sample and update SRTT / RTTVAR / RTO (RFC 6298 §2).
    ///
    /// On the first sample:  SRTT = R,  RTTVAR = R/2,  RTO = SRTT + 4·RTTVAR.
    /// Subsequent samples:   RTTVAR = 3/4·RTTVAR + 1/4·|SRTT − R|
    ///                       SRTT   = 7/8·SRTT   + 1/8·R
    pub fn record_rtt_sample(&mut self, sample: Duration) {
        match (self.srtt, self.rttvar) {
            (Some(srtt), Some(rttvar)) => {
                let diff = sample.abs_diff(srtt);
                self.rttvar = Some(rttvar * 3 / 4 + diff / 4);
                self.srtt = Some(srtt * 7 / 8 + sample / 8);
            }
            _ => {
                self.srtt = Some(sample);
                self.rttvar = Some(sample / 2);
            }
        }
        self.reset();
    }

    /// Double the RTO on retransmit timeout (exponential back-off, RFC 6298 §5.5).
    pub fn back_off(&mut self) {
        self.current_rto = (self.current_rto * 2).min(self.max_rto);
    }

    /// Restore `current_rto` from the current SRTT / RTTVAR estimates.
    ///
    /// Falls back to `initial_rto` before the first RTT sample is available.
    pub fn reset(&mut self) {
        self.current_rto = match (self.srtt, self.rttvar) {
            (Some(srtt), Some(rttvar)) => (srtt + rttvar * 4).max(self.min_rto).min(self.max_rto),
            _ => self.initial_rto,
        };
    }

    /// Arm the timer unless it is already running.
    pub fn arm(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.current_rto);
        }
    }

    /// Restart the timer from `now`, discarding any running deadline.
    pub fn restart(&mut self, now: Instant) {
        self.deadline = Some(now + self.current_rto);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }

    /// Consecutive expiries since the last forward progress.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Account for one expiry: count it, back off, and rearm.
    ///
    /// Returns the updated retry count.
    pub fn on_expired(&mut self, now: Instant) -> u32 {
        self.retries += 1;
        self.back_off();
        self.restart(now);
        self.retries
    }

    /// Forward progress: the oldest outstanding segment was acknowledged.
    ///
    /// Clears the retry count and RTO back-off, then restarts the timer if
    /// anything is still outstanding or disarms it otherwise.
    pub fn on_progress(&mut self, now: Instant, still_outstanding: bool) {
        self.retries = 0;
        self.reset();
        if still_outstanding {
            self.restart(now);
        } else {
            self.disarm();
        }
    }
}
