//! The per-connection event loop.
//!
//! # Architecture
//!
//! ```text
//!            wait_for_event(interest, deadline)
//!   Host ───────────────────────────────────────▶ one Event per wake
//!    ▲                                               │
//!    │ send_segment / deliver_to_app                 ▼
//!    └──────────────────────────────────  Connection ── Context
//!                                             │ handshake::on_segment
//!                                             │ teardown::on_*
//! ```
//!
//! A [`Connection`] owns its [`Context`] and its [`Host`] outright.  Waiting
//! on the host is the only suspension point; exactly one trigger is serviced
//! per wake, in [`Event`] priority order, before waiting again.

use std::io;

use tokio::time::Instant;

use crate::config::Config;
use crate::context::Context;
use crate::error::{Result, StcpError};
use crate::event::Event;
use crate::host::Host;
use crate::receiver::{Arrival, FinArrival};
use crate::segment::{Segment, MAX_SEGMENT};
use crate::state::ConnectionState;
use crate::teardown;

/// One connection: its state plus the collaborators it talks through.
///
/// Build one with [`Connection::connect`] or [`Connection::accept`], then
/// drive it to completion with [`Connection::run`].
pub struct Connection<H> {
    pub(crate) ctx: Context,
    pub(crate) host: H,
    /// A segment that completed the open and still needs data processing.
    pub(crate) leftover: Option<Segment>,
}

impl<H: Host> Connection<H> {
    pub(crate) fn new(host: H, config: Config) -> Self {
        Self {
            ctx: Context::new(config),
            host,
            leftover: None,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Serve the connection until both halves are closed.
    ///
    /// A fatal error leaves the context in CLOSED; a close timeout leaves it
    /// in CLOSED_FINAL, since our own half did close properly.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.drive().await;
        match &result {
            Ok(()) => log::info!("[stcp] connection closed"),
            Err(err) if err.is_fatal() => {
                log::warn!("[stcp] connection aborted in {}: {err}", self.ctx.state);
                self.ctx.state = ConnectionState::Closed;
            }
            Err(err) => {
                log::warn!("[stcp] {err}");
                self.ctx.state = ConnectionState::ClosedFinal;
            }
        }
        result
    }

    async fn drive(&mut self) -> Result<()> {
        if let Some(seg) = self.leftover.take() {
            self.on_segment(seg).await?;
        }
        while self.ctx.state != ConnectionState::ClosedFinal {
            self.step().await?;
        }
        Ok(())
    }

    /// Wait for one wake and service its highest-priority event.
    pub async fn step(&mut self) -> Result<()> {
        let interest = self.ctx.interest();
        let deadline = self.ctx.next_deadline();
        let events = self.host.wait_for_event(interest, deadline).await?;
        log::trace!("[stcp] {} woke with {events:?}", self.ctx.state);

        match events.first() {
            Some(Event::Timeout) => self.on_timeout().await,
            Some(Event::NetworkData) => match self.receive()? {
                Some(seg) => self.on_segment(seg).await,
                None => Ok(()),
            },
            Some(Event::AppData) => self.on_app_data().await,
            Some(Event::AppClose) => self.on_app_close().await,
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    async fn on_timeout(&mut self) -> Result<()> {
        let now = Instant::now();
        teardown::on_deadline(&mut self.ctx, now)?;
        if self.ctx.state != ConnectionState::ClosedFinal && self.ctx.timer.is_expired(now) {
            self.on_retransmit_timeout().await?;
        }
        Ok(())
    }

    /// Resend the oldest unacknowledged segment, or give up once the retry
    /// budget is spent.
    pub(crate) async fn on_retransmit_timeout(&mut self) -> Result<()> {
        let now = Instant::now();
        let retries = self.ctx.timer.on_expired(now);
        let max_retries = self.ctx.config.max_retries;
        if retries > max_retries {
            return Err(StcpError::PeerUnresponsive {
                retries: max_retries,
            });
        }
        let Some(seg) = self.ctx.retransmit.retransmit_oldest(now).cloned() else {
            self.ctx.timer.disarm();
            return Ok(());
        };
        log::debug!(
            "[stcp] retransmit #{retries} seq={} rto={:?}",
            seg.header.seq,
            self.ctx.timer.current_rto
        );
        self.transmit(&seg).await
    }

    async fn on_segment(&mut self, seg: Segment) -> Result<()> {
        log::debug!("[stcp] ← {seg}");
        let now = Instant::now();

        if seg.is_syn() {
            return self.on_stray_syn(seg).await;
        }

        if seg.is_ack() {
            let fin_was_acked = self.ctx.fin_acked;
            self.ctx.on_ack(seg.header.ack, seg.header.window, now);
            if !fin_was_acked && self.ctx.fin_acked {
                teardown::on_fin_acked(&mut self.ctx, now);
            }
        }

        let mut reply = false;
        if !seg.payload.is_empty() {
            reply = true;
            match self.ctx.receiver.on_segment(seg.header.seq, &seg.payload) {
                Arrival::InOrder(bytes) => {
                    log::debug!(
                        "[stcp] deliver {} bytes, rcv.nxt={}",
                        bytes.len(),
                        self.ctx.receiver.recv_next
                    );
                    self.host.deliver_to_app(bytes);
                    self.ctx.extend_close_deadline(now);
                }
                Arrival::Duplicate => log::debug!("[stcp] duplicate seq={}", seg.header.seq),
                Arrival::OutOfOrder => log::debug!(
                    "[stcp] out of order seq={} (expected {})",
                    seg.header.seq,
                    self.ctx.recv_next()
                ),
            }
        }

        if seg.is_fin() {
            reply = true;
            let fin_seq = seg.header.seq.wrapping_add(seg.payload.len() as u32);
            match self.ctx.receiver.on_fin(fin_seq) {
                FinArrival::Accepted => {
                    teardown::on_peer_fin(&mut self.ctx, now);
                    self.host.notify_peer_closed();
                }
                FinArrival::Duplicate => log::debug!("[stcp] re-ACK retransmitted FIN"),
                FinArrival::OutOfOrder => log::debug!("[stcp] FIN beyond a gap; dropped"),
            }
        }

        if reply {
            let ack = self.ctx.ack();
            self.transmit(&ack).await?;
        }
        // An ACK may have opened the window for a deferred FIN.
        self.send_fin_when_ready().await
    }

    /// A SYN after the open: our final handshake ACK was lost if it repeats
    /// the peer's ISN, otherwise the peer is confused.
    async fn on_stray_syn(&mut self, seg: Segment) -> Result<()> {
        if self.ctx.peer_isn != Some(seg.header.seq) {
            return Err(StcpError::ProtocolViolation {
                state: self.ctx.state,
                flags: seg.header.flags,
            });
        }
        log::debug!("[stcp] re-ACK retransmitted {}", seg.header.flags);
        let ack = self.ctx.ack();
        self.transmit(&ack).await
    }

    async fn on_app_data(&mut self) -> Result<()> {
        let usable = self.ctx.window.usable_window() as usize;
        let max = usable.min(self.ctx.config.effective_mss());
        if max == 0 {
            return Ok(());
        }
        let payload = self.host.read_from_app(max);
        if payload.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let seg = self.ctx.data(payload);
        self.ctx.record_sent(seg.clone(), now);
        self.ctx.extend_close_deadline(now);
        log::debug!(
            "[stcp] → DATA seq={} len={} in_flight={}",
            seg.header.seq,
            seg.payload.len(),
            self.ctx.window.data_in_flight()
        );
        self.transmit(&seg).await?;
        self.send_fin_when_ready().await
    }

    async fn on_app_close(&mut self) -> Result<()> {
        teardown::on_close_requested(&mut self.ctx, Instant::now())?;
        self.send_fin_when_ready().await
    }

    /// Send our FIN behind the last written byte, or keep deferring it.
    async fn send_fin_when_ready(&mut self) -> Result<()> {
        if !self.ctx.fin_ready(self.host.has_app_data()) {
            if self.ctx.close_requested && self.ctx.fin_seq.is_none() {
                log::trace!(
                    "[stcp] FIN deferred, usable window {}",
                    self.ctx.window.usable_window()
                );
            }
            return Ok(());
        }
        let fin = teardown::send_fin(&mut self.ctx, Instant::now())?;
        self.transmit(&fin).await
    }

    // -----------------------------------------------------------------------
    // Segment I/O
    // -----------------------------------------------------------------------

    pub(crate) async fn transmit(&mut self, seg: &Segment) -> Result<()> {
        if !seg.carries_information() {
            log::warn!("[stcp] refusing to send empty segment seq={}", seg.header.seq);
            return Ok(());
        }
        log::debug!("[stcp] → {seg}");
        self.host.send_segment(&seg.encode()).await?;
        Ok(())
    }

    /// Take the next datagram from the host and decode it.  Malformed
    /// datagrams are dropped here without any state change.
    pub(crate) fn receive(&mut self) -> Result<Option<Segment>> {
        let mut buf = [0u8; MAX_SEGMENT];
        let n = match self.host.receive_segment(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match Segment::decode(&buf[..n]) {
            Ok(seg) => Ok(Some(seg)),
            Err(e) => {
                log::warn!("[stcp] dropping malformed segment ({n} bytes): {e}");
                Ok(None)
            }
        }
    }
}
