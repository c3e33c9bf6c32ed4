//! Connection finite-state machine (FSM) types.
//!
//! This module defines every state a connection can occupy.  Transitions are
//! driven by [`crate::handshake`] (open) and [`crate::teardown`] (close); the
//! data-transfer engine only reads the state to decide what it may do.
//!
//! ```text
//!  CLOSED ──SYN sent──▶ SYN_SENT ──SYN-ACK──▶ ESTABLISHED
//!    │                     │ SYN (simultaneous open)  ▲
//!    │ SYN rcvd            ▼                          │
//!    └─────────────▶ SYN_RECEIVED ───ACK / SYN-ACK────┘
//!
//!  ESTABLISHED ──close──▶ FIN_WAIT ──FIN (FIN acked)──▶ TIME_WAIT ──▶ CLOSED_FINAL
//!       │                    │ FIN (FIN unacked)            ▲
//!       │                    ▼                              │
//!       │                 CLOSING ───────ACK of FIN─────────┘
//!       │ FIN rcvd
//!       ▼
//!  CLOSE_WAIT ──close──▶ LAST_ACK ──ACK of FIN──▶ CLOSED_FINAL
//! ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection exists; initial state.
    #[default]
    Closed,
    /// SYN has been sent; waiting for SYN-ACK.
    SynSent,
    /// SYN received and SYN-ACK sent; waiting for the ACK of our SYN.
    SynReceived,
    /// Three-way handshake complete; data transfer in progress.
    Established,
    /// Local FIN sent; waiting for its ACK and for the peer's FIN.
    FinWait,
    /// Peer's FIN received; local close pending.
    CloseWait,
    /// Both sides sent FIN before seeing the other's; waiting for our FIN's ACK.
    Closing,
    /// Local FIN sent after the peer's; waiting for its ACK.
    LastAck,
    /// Both FINs exchanged; lingering to re-ACK a retransmitted peer FIN.
    TimeWait,
    /// Both halves closed; the context can be dropped.
    ClosedFinal,
}

impl ConnectionState {
    /// `true` while the application may still hand us bytes to send.
    pub fn can_send(self) -> bool {
        matches!(
            self,
            ConnectionState::Established | ConnectionState::CloseWait
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Closed => "CLOSED",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynReceived => "SYN_RECEIVED",
            ConnectionState::Established => "ESTABLISHED",
            ConnectionState::FinWait => "FIN_WAIT",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::LastAck => "LAST_ACK",
            ConnectionState::TimeWait => "TIME_WAIT",
            ConnectionState::ClosedFinal => "CLOSED_FINAL",
        };
        f.write_str(name)
    }
}
