//! Connection-level error taxonomy.
//!
//! Every error is local to one connection.  Malformed, duplicate and
//! out-of-order segments are recovered silently inside the engine; only the
//! variants below ever reach the application.

use std::io;

use thiserror::Error;

use crate::segment::{Flags, SegmentError};
use crate::state::ConnectionState;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StcpError>;

#[derive(Debug, Error)]
pub enum StcpError {
    /// A datagram could not be decoded.  The engine drops these itself; the
    /// variant surfaces only from direct codec use.
    #[error("malformed segment: {0}")]
    MalformedSegment(#[from] SegmentError),

    /// Unexpected flags or acknowledgement number during the open.
    #[error("handshake failed in {state}: {reason}")]
    HandshakeFailed {
        state: ConnectionState,
        reason: String,
    },

    /// The retransmission retry budget ran out.
    #[error("peer unresponsive after {retries} retransmissions")]
    PeerUnresponsive { retries: u32 },

    /// The peer never completed its half of the close in time.  The local
    /// FIN was sent correctly, so this is a warning rather than a failure.
    #[error("peer did not finish closing within the close timeout")]
    CloseTimeout,

    /// A flag combination that makes no sense in the current state.
    #[error("protocol violation in {state}: unexpected {flags}")]
    ProtocolViolation {
        state: ConnectionState,
        flags: Flags,
    },

    #[error("link I/O error: {0}")]
    Io(#[from] io::Error),

    /// The engine task is gone (it finished or panicked) or the application
    /// handle was dropped.
    #[error("application channel closed")]
    ApplicationGone,

    /// A write on a stream whose sending half was already shut down.
    #[error("write after shutdown")]
    WriteAfterShutdown,
}

impl StcpError {
    /// `false` only for [`StcpError::CloseTimeout`], a partial close that
    /// still leaves the local side consistent.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StcpError::CloseTimeout)
    }
}

impl From<StcpError> for io::Error {
    fn from(err: StcpError) -> io::Error {
        let kind = match &err {
            StcpError::HandshakeFailed { .. } => io::ErrorKind::ConnectionRefused,
            StcpError::PeerUnresponsive { .. } | StcpError::CloseTimeout => {
                io::ErrorKind::TimedOut
            }
            StcpError::MalformedSegment(_) => io::ErrorKind::InvalidData,
            StcpError::ProtocolViolation { .. } => io::ErrorKind::ConnectionAborted,
            StcpError::ApplicationGone | StcpError::WriteAfterShutdown => {
                io::ErrorKind::BrokenPipe
            }
            StcpError::Io(inner) => inner.kind(),
        };
        io::Error::new(kind, err)
    }
}
