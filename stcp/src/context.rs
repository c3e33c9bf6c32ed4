//! Per-connection state.
//!
//! A [`Context`] is created when an open is requested and is owned by the
//! single engine task serving that connection; nothing else mutates it.  It
//! bundles the send window, receive tracking, retransmission queue and
//! deadlines, and knows how to build every kind of outgoing segment.

use tokio::time::Instant;

use crate::config::Config;
use crate::event::{Event, EventSet};
use crate::receiver::Receiver;
use crate::segment::{Flags, Segment};
use crate::sender::RetransmitQueue;
use crate::state::ConnectionState;
use crate::timer::RetransmitTimer;
use crate::window::{AckOutcome, SendWindow};

#[derive(Debug)]
pub struct Context {
    pub state: ConnectionState,
    pub config: Config,
    /// Our initial sequence number.
    pub isn: u32,
    /// The peer's initial sequence number, once its SYN was seen.
    pub peer_isn: Option<u32>,
    pub window: SendWindow,
    pub receiver: Receiver,
    pub retransmit: RetransmitQueue,
    pub timer: RetransmitTimer,
    /// Sequence number of our FIN, once sent.
    pub fin_seq: Option<u32>,
    pub fin_acked: bool,
    /// The application asked to close; our FIN may still be waiting for
    /// queued data or window space.
    pub close_requested: bool,
    /// Bound on the wait for the peer to finish closing.
    pub close_deadline: Option<Instant>,
    /// End of the TIME_WAIT linger.
    pub time_wait_deadline: Option<Instant>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        let isn = config.initial_sequence_number();
        Self {
            state: ConnectionState::Closed,
            isn,
            peer_isn: None,
            window: SendWindow::new(isn, config.congestion_window),
            receiver: Receiver::new(0, config.local_window),
            retransmit: RetransmitQueue::new(),
            timer: RetransmitTimer::new(&config),
            fin_seq: None,
            fin_acked: false,
            close_requested: false,
            close_deadline: None,
            time_wait_deadline: None,
            config,
        }
    }

    pub fn recv_next(&self) -> u32 {
        self.receiver.ack_number()
    }

    /// Remember the peer's SYN: its ISN, its window, and the next byte expected.
    pub fn on_peer_syn(&mut self, syn: &Segment) {
        self.peer_isn = Some(syn.header.seq);
        self.receiver = Receiver::new(syn.header.seq.wrapping_add(1), self.config.local_window);
        self.window.peer_window = syn.header.window;
    }

    fn segment(&self, seq: u32, flags: Flags, payload: Vec<u8>) -> Segment {
        let ack = if flags.contains(Flags::ACK) {
            self.recv_next()
        } else {
            0
        };
        Segment::new(seq, ack, flags, self.receiver.window_size(), payload)
    }

    pub fn syn(&self) -> Segment {
        self.segment(self.isn, Flags::SYN, Vec::new())
    }

    pub fn syn_ack(&self) -> Segment {
        self.segment(self.isn, Flags::SYN | Flags::ACK, Vec::new())
    }

    /// A pure cumulative ACK for `recv_next`.
    pub fn ack(&self) -> Segment {
        self.segment(self.window.send_next, Flags::ACK, Vec::new())
    }

    pub fn data(&self, payload: Vec<u8>) -> Segment {
        self.segment(self.window.send_next, Flags::ACK, payload)
    }

    pub fn fin(&self) -> Segment {
        self.segment(self.window.send_next, Flags::FIN | Flags::ACK, Vec::new())
    }

    /// Account for a freshly transmitted segment that occupies sequence space.
    pub fn record_sent(&mut self, segment: Segment, now: Instant) {
        self.window.on_send(segment.seq_len());
        self.retransmit.record_sent(segment, now);
        self.timer.arm(now);
    }

    /// Feed one acknowledgement through the window accountant.
    ///
    /// On forward progress the retransmission queue is trimmed, the RTO
    /// estimate updated and the timer restarted or disarmed.  A duplicate
    /// ACK leaves the timer untouched.
    pub fn on_ack(&mut self, ack: u32, window: u16, now: Instant) -> AckOutcome {
        let outcome = self.window.on_ack(ack, window);
        if let AckOutcome::Advanced(_) = outcome {
            if let Some(sample) = self.retransmit.on_ack(ack, now) {
                self.timer.record_rtt_sample(sample);
            }
            self.timer.on_progress(now, !self.retransmit.is_empty());
            if let Some(fin_seq) = self.fin_seq {
                self.fin_acked = self.window.is_acked(fin_seq.wrapping_add(1));
            }
            self.extend_close_deadline(now);
        }
        outcome
    }

    /// Push an armed close bound out while a half that is still open moves
    /// data: ours until our FIN is sent, the peer's in FIN_WAIT.
    pub fn extend_close_deadline(&mut self, now: Instant) {
        let open_half = match self.state {
            ConnectionState::Established | ConnectionState::CloseWait => self.fin_seq.is_none(),
            ConnectionState::FinWait => true,
            _ => false,
        };
        if open_half && self.close_deadline.is_some() {
            self.close_deadline = Some(now + self.config.close_timeout);
        }
    }

    /// Our FIN can go out: a close was requested, nothing written is left
    /// unsent and the window has room for one more sequence number.
    pub fn fin_ready(&self, app_data_pending: bool) -> bool {
        self.close_requested
            && self.fin_seq.is_none()
            && self.state.can_send()
            && !app_data_pending
            && self.window.usable_window() > 0
    }

    /// Events the engine wants to hear about in the current state.
    pub fn interest(&self) -> EventSet {
        let mut set = EventSet::from(Event::NetworkData);
        if self.state.can_send() && self.fin_seq.is_none() {
            if self.window.usable_window() > 0 {
                set.insert(Event::AppData);
            }
            // A close is observed even with a closed window.
            if !self.close_requested {
                set.insert(Event::AppClose);
            }
        }
        set
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.timer.deadline(),
            self.close_deadline,
            self.time_wait_deadline,
        ]
        .into_iter()
        .flatten()
        .min()
    }
}
