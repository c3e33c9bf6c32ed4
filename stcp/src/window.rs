//! Send-side window accounting.
//!
//! [`SendWindow`] tracks the send sequence space and the peer's advertised
//! receive window, and decides how many new bytes may enter the network.
//!
//! # Sequence-number layout
//!
//! ```text
//!  send_unacked        send_next        send_unacked + min(peer_window, cwnd)
//!      │                   │                       │
//!  ────┼───────────────────┼───────────────────────┼──────▶ seq space
//!      │ <── in flight ──▶ │ <──── usable ───────▶ │
//! ```
//!
//! ACKs are cumulative and never move `send_unacked` backwards.  This module
//! only manages numbers; retransmission bookkeeping lives in
//! [`crate::sender`].

use crate::seq::{seq_in_half_open, seq_le};

/// Result of feeding one acknowledgement to [`SendWindow::on_ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// `send_unacked` moved forward by this many sequence numbers.
    Advanced(u32),
    /// `ack == send_unacked`: nothing new, but the window was refreshed.
    Duplicate,
    /// Acknowledges data never sent or already behind `send_unacked`.
    Ignored,
}

/// Send sequence space and flow-control state for one connection.
#[derive(Debug, Clone)]
pub struct SendWindow {
    /// Oldest sequence number sent but not yet acknowledged.
    pub send_unacked: u32,
    /// Next sequence number to assign to outgoing data.
    pub send_next: u32,
    /// Most recently advertised peer receive window, in bytes.
    pub peer_window: u16,
    /// Fixed congestion window, in bytes.
    pub congestion_window: u32,
}

impl SendWindow {
    /// Start a send space at the initial sequence number `isn`.
    ///
    /// Nothing is in flight until the SYN is recorded with [`SendWindow::on_send`].
    pub fn new(isn: u32, congestion_window: u32) -> Self {
        Self {
            send_unacked: isn,
            send_next: isn,
            peer_window: 0,
            congestion_window,
        }
    }

    /// Sequence numbers sent but not yet acknowledged.
    pub fn data_in_flight(&self) -> u32 {
        self.send_next.wrapping_sub(self.send_unacked)
    }

    /// `min(peer_window, congestion_window)`.
    pub fn effective_window(&self) -> u32 {
        u32::from(self.peer_window).min(self.congestion_window)
    }

    /// Bytes that may be sent right now without overrunning either window.
    pub fn usable_window(&self) -> u32 {
        self.effective_window().saturating_sub(self.data_in_flight())
    }

    /// Record `len` freshly sent sequence numbers.
    pub fn on_send(&mut self, len: u32) {
        self.send_next = self.send_next.wrapping_add(len);
    }

    /// Process a cumulative acknowledgement and the window it advertises.
    ///
    /// `send_unacked` only moves for `ack` in `(send_unacked, send_next]`.  A
    /// duplicate (`ack == send_unacked`) still refreshes `peer_window`; an ACK
    /// outside the valid range changes nothing.
    pub fn on_ack(&mut self, ack: u32, window: u16) -> AckOutcome {
        if ack == self.send_unacked {
            self.peer_window = window;
            return AckOutcome::Duplicate;
        }
        if !seq_in_half_open(ack, self.send_unacked, self.send_next) {
            return AckOutcome::Ignored;
        }
        let advanced = ack.wrapping_sub(self.send_unacked);
        self.send_unacked = ack;
        self.peer_window = window;
        AckOutcome::Advanced(advanced)
    }

    /// `true` once everything sent up to `seq_end` has been acknowledged.
    pub fn is_acked(&self, seq_end: u32) -> bool {
        seq_le(seq_end, self.send_unacked)
    }
}
