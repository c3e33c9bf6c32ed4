//! Connection open: active, passive and simultaneous.
//!
//! ```text
//!  active:   CLOSED ─SYN→ SYN_SENT ─(SYN-ACK, ack=isn+1)/ACK→ ESTABLISHED
//!  passive:  CLOSED ─(SYN)/SYN-ACK→ SYN_RECEIVED ─(ACK, ack=isn+1)→ ESTABLISHED
//!  simultaneous:
//!            SYN_SENT ─(SYN)/SYN-ACK→ SYN_RECEIVED ─(SYN-ACK, ack=isn+1)/ACK→ ESTABLISHED
//! ```
//!
//! [`on_segment`] is the pure transition function; [`Connection::connect`]
//! and [`Connection::accept`] drive it against a [`Host`], retransmitting the
//! outstanding SYN or SYN-ACK on timeout.

use tokio::time::Instant;

use crate::config::Config;
use crate::context::Context;
use crate::engine::Connection;
use crate::error::{Result, StcpError};
use crate::event::{Event, EventSet};
use crate::host::Host;
use crate::segment::Segment;
use crate::state::ConnectionState;

/// What the driver does after one handshake segment.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Keep waiting, sending `reply` first if present.
    Continue(Option<Segment>),
    /// The connection is open.  Send `reply` if present, then hand
    /// `leftover` (a segment that also carried data or FIN) to the engine.
    Established {
        reply: Option<Segment>,
        leftover: Option<Segment>,
    },
}

fn failed(ctx: &Context, reason: String) -> StcpError {
    StcpError::HandshakeFailed {
        state: ctx.state,
        reason,
    }
}

/// Advance the handshake with one inbound segment.
pub fn on_segment(ctx: &mut Context, seg: Segment, now: Instant) -> Result<Step> {
    let expected_ack = ctx.isn.wrapping_add(1);
    let (syn, ack, fin) = (seg.is_syn(), seg.is_ack(), seg.is_fin());

    match ctx.state {
        ConnectionState::Closed => {
            if !syn || ack || fin {
                return Err(failed(ctx, format!("expected SYN, got {}", seg.header.flags)));
            }
            ctx.on_peer_syn(&seg);
            ctx.state = ConnectionState::SynReceived;
            let syn_ack = ctx.syn_ack();
            ctx.record_sent(syn_ack.clone(), now);
            Ok(Step::Continue(Some(syn_ack)))
        }

        ConnectionState::SynSent => match (syn, ack, fin) {
            (true, true, false) => {
                if seg.header.ack != expected_ack {
                    return Err(failed(
                        ctx,
                        format!("SYN-ACK acknowledges {}, expected {expected_ack}", seg.header.ack),
                    ));
                }
                ctx.on_peer_syn(&seg);
                establish(ctx, &seg, now);
                Ok(Step::Established {
                    reply: Some(ctx.ack()),
                    leftover: None,
                })
            }
            (true, false, false) => {
                // Simultaneous open: our SYN crossed theirs.  The SYN-ACK
                // reuses our ISN, so it replaces the queued SYN.
                ctx.on_peer_syn(&seg);
                ctx.state = ConnectionState::SynReceived;
                let syn_ack = ctx.syn_ack();
                ctx.retransmit.replace_oldest(syn_ack.clone());
                Ok(Step::Continue(Some(syn_ack)))
            }
            _ => Err(failed(ctx, format!("unexpected {}", seg.header.flags))),
        },

        ConnectionState::SynReceived => {
            if fin && !ack {
                return Err(failed(ctx, "FIN before the handshake completed".into()));
            }
            let same_peer = ctx.peer_isn == Some(seg.header.seq);
            match (syn, ack) {
                // The peer retransmitted its SYN: our SYN-ACK was lost.
                (true, false) if same_peer => Ok(Step::Continue(Some(ctx.syn_ack()))),
                (true, false) => Err(failed(ctx, "SYN with a different ISN".into())),
                (_, true) => {
                    if seg.header.ack != expected_ack {
                        return Err(failed(
                            ctx,
                            format!("ACK {} does not match expected {expected_ack}", seg.header.ack),
                        ));
                    }
                    if syn && !same_peer {
                        return Err(failed(ctx, "SYN-ACK with a different ISN".into()));
                    }
                    establish(ctx, &seg, now);
                    let carries_more = !syn && (!seg.payload.is_empty() || fin);
                    Ok(Step::Established {
                        reply: syn.then(|| ctx.ack()),
                        leftover: carries_more.then_some(seg),
                    })
                }
                (false, false) => Err(failed(ctx, "data before the handshake completed".into())),
            }
        }

        state => Err(StcpError::ProtocolViolation {
            state,
            flags: seg.header.flags,
        }),
    }
}

fn establish(ctx: &mut Context, seg: &Segment, now: Instant) {
    ctx.on_ack(seg.header.ack, seg.header.window, now);
    ctx.state = ConnectionState::Established;
}

impl<H: Host> Connection<H> {
    /// Active open: send SYN and wait for the connection to be established.
    pub async fn connect(host: H, config: Config) -> Result<Self> {
        let mut conn = Self::new(host, config);
        let syn = conn.ctx.syn();
        conn.ctx.record_sent(syn.clone(), Instant::now());
        conn.ctx.state = ConnectionState::SynSent;
        log::info!("[stcp] connect: isn={}", conn.ctx.isn);
        conn.transmit(&syn).await?;
        conn.handshake().await?;
        Ok(conn)
    }

    /// Passive open: wait for a SYN and complete the handshake.
    pub async fn accept(host: H, config: Config) -> Result<Self> {
        let mut conn = Self::new(host, config);
        log::info!("[stcp] accept: isn={}", conn.ctx.isn);
        conn.handshake().await?;
        Ok(conn)
    }

    async fn handshake(&mut self) -> Result<()> {
        let result = self.drive_handshake().await;
        if let Err(ref err) = result {
            log::warn!("[stcp] open failed in {}: {err}", self.ctx.state);
            self.ctx.state = ConnectionState::Closed;
        }
        result
    }

    async fn drive_handshake(&mut self) -> Result<()> {
        loop {
            let deadline = self.ctx.timer.deadline();
            let events = self
                .host
                .wait_for_event(EventSet::from(Event::NetworkData), deadline)
                .await?;

            match events.first() {
                Some(Event::Timeout) => self.on_retransmit_timeout().await?,
                Some(Event::NetworkData) => {
                    let Some(seg) = self.receive()? else { continue };
                    log::debug!("[stcp] ← {seg}");
                    match on_segment(&mut self.ctx, seg, Instant::now())? {
                        Step::Continue(reply) => {
                            if let Some(reply) = reply {
                                self.transmit(&reply).await?;
                            }
                        }
                        Step::Established { reply, leftover } => {
                            if let Some(reply) = reply {
                                self.transmit(&reply).await?;
                            }
                            self.leftover = leftover;
                            log::info!(
                                "[stcp] ESTABLISHED snd.una={} rcv.nxt={} peer_win={}",
                                self.ctx.window.send_unacked,
                                self.ctx.recv_next(),
                                self.ctx.window.peer_window
                            );
                            return Ok(());
                        }
                    }
                }
                _ => {}
            }
        }
    }
}
