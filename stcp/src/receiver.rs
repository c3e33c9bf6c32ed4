//! Receive-side sequence tracking.
//!
//! [`Receiver`] implements a cumulative-ACK receiver without reassembly:
//!
//! - Only bytes starting exactly at `recv_next` are accepted.
//! - Bytes already received are never delivered twice.  A retransmission
//!   that overlaps new data delivers only the new tail.
//! - Segments starting beyond `recv_next` are dropped; the peer's
//!   retransmission will resend them in order.
//! - After every data segment (accepted or not) the caller sends a
//!   **cumulative ACK** carrying [`Receiver::ack_number`].
//!
//! This module only manages state; all I/O is the caller's responsibility.

use crate::seq::{seq_gt, seq_lt};

/// Classification of an inbound payload.
#[derive(Debug, PartialEq, Eq)]
pub enum Arrival<'a> {
    /// These bytes are new and in order; deliver them.
    InOrder(&'a [u8]),
    /// Everything in the segment was delivered before.
    Duplicate,
    /// The segment starts after a gap and was dropped.
    OutOfOrder,
}

/// Classification of an inbound FIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinArrival {
    /// First sight of the peer's FIN; `recv_next` consumed it.
    Accepted,
    /// A retransmission of a FIN already consumed.
    Duplicate,
    /// The FIN sits beyond missing data and was ignored.
    OutOfOrder,
}

/// Receive-side state for one connection.
#[derive(Debug, Clone)]
pub struct Receiver {
    /// Next in-order sequence number expected from the peer.
    pub recv_next: u32,
    /// Receive window advertised in every outgoing segment (fixed).
    window: u16,
    fin_received: bool,
}

impl Receiver {
    /// `recv_next` is the first sequence number expected from the peer; after
    /// the peer's SYN this is `peer_isn + 1`.
    pub fn new(recv_next: u32, window: u16) -> Self {
        Self {
            recv_next,
            window,
            fin_received: false,
        }
    }

    /// Process an inbound payload that starts at `seq`.
    pub fn on_segment<'a>(&mut self, seq: u32, payload: &'a [u8]) -> Arrival<'a> {
        if payload.is_empty() {
            return Arrival::Duplicate;
        }
        if seq_gt(seq, self.recv_next) {
            return Arrival::OutOfOrder;
        }
        let end = seq.wrapping_add(payload.len() as u32);
        if !seq_lt(self.recv_next, end) || self.fin_received {
            return Arrival::Duplicate;
        }
        let skip = self.recv_next.wrapping_sub(seq) as usize;
        let fresh = &payload[skip..];
        self.recv_next = end;
        Arrival::InOrder(fresh)
    }

    /// Consume the peer's FIN, which occupies sequence number `fin_seq`.
    pub fn on_fin(&mut self, fin_seq: u32) -> FinArrival {
        if self.fin_received {
            if fin_seq.wrapping_add(1) == self.recv_next {
                return FinArrival::Duplicate;
            }
            return FinArrival::OutOfOrder;
        }
        if fin_seq != self.recv_next {
            return FinArrival::OutOfOrder;
        }
        self.recv_next = self.recv_next.wrapping_add(1);
        self.fin_received = true;
        FinArrival::Accepted
    }

    pub fn fin_received(&self) -> bool {
        self.fin_received
    }

    /// Cumulative ACK number to place in the next outbound segment.
    pub fn ack_number(&self) -> u32 {
        self.recv_next
    }

    /// Advertised receive window to place in outbound segments.
    pub fn window_size(&self) -> u16 {
        self.window
    }
}
