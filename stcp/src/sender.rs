//! Retransmission queue for outbound segments.
//!
//! Every segment that occupies sequence space (data, SYN, FIN) is kept here
//! until a cumulative ACK covers it.  On timeout the engine resends only the
//! **oldest** entry, unchanged; the peer's cumulative ACK then tells us how
//! far it got.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::VecDeque;

use tokio::time::Instant;

use crate::segment::Segment;
use crate::seq::seq_le;

/// A segment that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    /// The segment exactly as first transmitted.
    pub segment: Segment,
    /// How many times this segment has been transmitted (1 = first send).
    pub tx_count: u32,
    /// Time of the most recent transmission (for RTT sampling).
    pub sent_at: Instant,
}

/// Segments in flight, ordered by sequence number (front = oldest).
#[derive(Debug, Default)]
pub struct RetransmitQueue {
    entries: VecDeque<RetransmitEntry>,
}

impl RetransmitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a just-transmitted segment at the back of the queue.
    pub fn record_sent(&mut self, segment: Segment, now: Instant) {
        debug_assert!(segment.seq_len() > 0, "pure ACKs are never retransmitted");
        self.entries.push_back(RetransmitEntry {
            segment,
            tx_count: 1,
            sent_at: now,
        });
    }

    /// Drop every entry fully covered by the cumulative `ack`.
    ///
    /// Returns the RTT sample of the newest removed entry if it was never
    /// retransmitted (Karn's rule), or `None` otherwise.
    pub fn on_ack(&mut self, ack: u32, now: Instant) -> Option<std::time::Duration> {
        let mut sample = None;
        while let Some(front) = self.entries.front() {
            if !seq_le(front.segment.seq_end(), ack) {
                break;
            }
            sample = (front.tx_count == 1).then(|| now.duration_since(front.sent_at));
            self.entries.pop_front();
        }
        sample
    }

    /// The oldest unacknowledged segment, marked as retransmitted.
    pub fn retransmit_oldest(&mut self, now: Instant) -> Option<&Segment> {
        let entry = self.entries.front_mut()?;
        entry.tx_count += 1;
        entry.sent_at = now;
        Some(&entry.segment)
    }

    /// Replace the oldest entry with `segment`, keeping its retry accounting.
    ///
    /// Used when a simultaneous open turns our queued SYN into a SYN-ACK that
    /// occupies the same sequence number.
    pub fn replace_oldest(&mut self, segment: Segment) {
        if let Some(entry) = self.entries.front_mut() {
            debug_assert_eq!(entry.segment.header.seq, segment.header.seq);
            entry.segment = segment;
        }
    }

    pub fn oldest(&self) -> Option<&RetransmitEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
