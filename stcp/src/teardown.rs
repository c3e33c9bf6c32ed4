//! Connection close.
//!
//! Each half of the stream closes independently: our FIN ends what we send,
//! the peer's FIN ends what we receive.  The functions here only move
//! [`Context`] between states and arm the close deadlines; the engine does
//! the segment I/O around them.
//!
//! A close request arms `close_deadline` at once, even if our FIN must wait
//! for queued data or a closed peer window.  From then on, and whenever the
//! peer's FIN arrives first, the deadline bounds how long we wait.  It is
//! pushed out while an open half still moves data.  Expiry force-closes the
//! connection with [`StcpError::CloseTimeout`].

use tokio::time::Instant;

use crate::context::Context;
use crate::error::{Result, StcpError};
use crate::segment::{Flags, Segment};
use crate::state::ConnectionState;

/// The application asked to close.  Our FIN follows once
/// [`Context::fin_ready`] holds.
pub fn on_close_requested(ctx: &mut Context, now: Instant) -> Result<()> {
    if !ctx.state.can_send() {
        return Err(StcpError::ProtocolViolation {
            state: ctx.state,
            flags: Flags::FIN,
        });
    }
    ctx.close_requested = true;
    if ctx.close_deadline.is_none() {
        ctx.close_deadline = Some(now + ctx.config.close_timeout);
    }
    log::debug!("[stcp] close requested in {}", ctx.state);
    Ok(())
}

/// Build our FIN and account for it.
///
/// The returned segment has already been queued for retransmission.
pub fn send_fin(ctx: &mut Context, now: Instant) -> Result<Segment> {
    let next = match ctx.state {
        ConnectionState::Established => ConnectionState::FinWait,
        ConnectionState::CloseWait => ConnectionState::LastAck,
        state => {
            return Err(StcpError::ProtocolViolation {
                state,
                flags: Flags::FIN,
            })
        }
    };
    let fin = ctx.fin();
    ctx.fin_seq = Some(fin.header.seq);
    ctx.record_sent(fin.clone(), now);
    ctx.close_deadline = Some(now + ctx.config.close_timeout);
    log::info!("[stcp] {} -> {next}: FIN seq={}", ctx.state, fin.header.seq);
    ctx.state = next;
    Ok(fin)
}

/// The peer acknowledged our FIN.
pub fn on_fin_acked(ctx: &mut Context, now: Instant) {
    match ctx.state {
        ConnectionState::Closing => enter_time_wait(ctx, now),
        ConnectionState::LastAck => {
            log::info!("[stcp] LAST_ACK -> CLOSED_FINAL");
            ctx.state = ConnectionState::ClosedFinal;
        }
        ConnectionState::FinWait => log::debug!("[stcp] FIN acked; awaiting peer FIN"),
        _ => {}
    }
}

/// The peer's FIN was consumed in order.
pub fn on_peer_fin(ctx: &mut Context, now: Instant) {
    match ctx.state {
        ConnectionState::Established => {
            log::info!("[stcp] ESTABLISHED -> CLOSE_WAIT: peer finished sending");
            ctx.state = ConnectionState::CloseWait;
            ctx.close_deadline = Some(now + ctx.config.close_timeout);
        }
        ConnectionState::FinWait if ctx.fin_acked => enter_time_wait(ctx, now),
        ConnectionState::FinWait => {
            log::info!("[stcp] FIN_WAIT -> CLOSING: simultaneous close");
            ctx.state = ConnectionState::Closing;
        }
        _ => {}
    }
}

/// Both FINs are exchanged and acknowledged; linger for a retransmitted
/// peer FIN, or finish at once when no linger is configured.
pub fn enter_time_wait(ctx: &mut Context, now: Instant) {
    ctx.close_deadline = None;
    if ctx.config.time_wait.is_zero() {
        log::info!("[stcp] {} -> CLOSED_FINAL", ctx.state);
        ctx.state = ConnectionState::ClosedFinal;
        return;
    }
    log::info!("[stcp] {} -> TIME_WAIT", ctx.state);
    ctx.state = ConnectionState::TimeWait;
    ctx.time_wait_deadline = Some(now + ctx.config.time_wait);
}

/// Handle the teardown deadlines that have passed by `now`.
///
/// The end of TIME_WAIT closes the connection normally; an expired close
/// deadline force-closes it and reports [`StcpError::CloseTimeout`].
pub fn on_deadline(ctx: &mut Context, now: Instant) -> Result<()> {
    if ctx.time_wait_deadline.is_some_and(|d| d <= now) {
        log::info!("[stcp] TIME_WAIT -> CLOSED_FINAL");
        ctx.time_wait_deadline = None;
        ctx.state = ConnectionState::ClosedFinal;
        return Ok(());
    }
    if ctx.close_deadline.is_some_and(|d| d <= now) {
        log::warn!(
            "[stcp] close timed out in {}; forcing CLOSED_FINAL",
            ctx.state
        );
        ctx.close_deadline = None;
        ctx.state = ConnectionState::ClosedFinal;
        return Err(StcpError::CloseTimeout);
    }
    Ok(())
}
