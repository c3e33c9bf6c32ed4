//! Collaborator seams between the protocol engine and the outside world.
//!
//! The engine never touches a socket or an application buffer directly.  It
//! talks to a [`Host`], which provides the blocking "wait for one of these
//! events or a deadline" primitive plus segment and application I/O.
//! [`ChannelHost`] is the tokio implementation: it pairs a datagram [`Link`]
//! with the mpsc channels behind [`crate::stream::StcpStream`].
//!
//! ```text
//!   StcpStream ──AppRequest──▶ ┌─────────────┐ ──datagrams──▶ Link
//!              ◀──AppEvent──── │ ChannelHost │ ◀────────────
//!                              └──────┬──────┘
//!                                     │ Host trait
//!                                 Connection
//! ```

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::error::Result;
use crate::event::{Event, EventSet};
use crate::segment::MAX_SEGMENT;

/// Bytes buffered from the application before we stop reading its channel.
const OUTGOING_CAP: usize = 64 * 1024;

/// An unreliable datagram primitive: whole datagrams, possibly lost,
/// duplicated or reordered.
#[async_trait]
pub trait Link: Send + Sync {
    async fn send(&self, datagram: &[u8]) -> io::Result<()>;

    /// Receive one datagram into `buf`, truncating it if `buf` is too small.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Everything the engine consumes from its environment.
#[async_trait]
pub trait Host: Send {
    /// Block until at least one event in `interest` is signalled or
    /// `deadline` passes.  Several events may be reported at once; an event
    /// stays signalled until the engine consumes it.
    async fn wait_for_event(
        &mut self,
        interest: EventSet,
        deadline: Option<Instant>,
    ) -> Result<EventSet>;

    async fn send_segment(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Copy the next received datagram into `buf`.
    fn receive_segment(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Pull up to `max_bytes` of application data.
    fn read_from_app(&mut self, max_bytes: usize) -> Vec<u8>;

    /// Application bytes are buffered but not yet pulled.  The engine holds
    /// its FIN back until this is `false`.
    fn has_app_data(&self) -> bool;

    fn deliver_to_app(&mut self, bytes: &[u8]);

    /// The peer's byte stream has ended.
    fn notify_peer_closed(&mut self);
}

/// Requests from the application to its engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppRequest {
    Write(Vec<u8>),
    Close,
}

/// Notifications from the engine to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Data(Vec<u8>),
    PeerClosed,
}

/// A [`Host`] backed by a [`Link`] and application channels.
pub struct ChannelHost<L> {
    link: L,
    from_app: mpsc::Receiver<AppRequest>,
    to_app: mpsc::UnboundedSender<AppEvent>,
    inbound: VecDeque<Vec<u8>>,
    outgoing: VecDeque<u8>,
    close_requested: bool,
}

impl<L: Link> ChannelHost<L> {
    pub fn new(
        link: L,
        from_app: mpsc::Receiver<AppRequest>,
        to_app: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            link,
            from_app,
            to_app,
            inbound: VecDeque::new(),
            outgoing: VecDeque::new(),
            close_requested: false,
        }
    }

    /// Events in `interest` that are signalled right now.
    fn ready(&self, interest: EventSet, deadline: Option<Instant>) -> EventSet {
        let mut set = EventSet::empty();
        if interest.contains(Event::NetworkData) && !self.inbound.is_empty() {
            set.insert(Event::NetworkData);
        }
        if interest.contains(Event::AppData) && !self.outgoing.is_empty() {
            set.insert(Event::AppData);
        }
        if interest.contains(Event::AppClose) && self.close_requested {
            set.insert(Event::AppClose);
        }
        if deadline.is_some_and(|d| d <= Instant::now()) {
            set.insert(Event::Timeout);
        }
        set
    }
}

async fn recv_datagram<L: Link>(link: &L) -> io::Result<Vec<u8>> {
    let mut buf = [0u8; MAX_SEGMENT];
    let n = link.recv(&mut buf).await?;
    Ok(buf[..n].to_vec())
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl<L: Link> Host for ChannelHost<L> {
    async fn wait_for_event(
        &mut self,
        interest: EventSet,
        deadline: Option<Instant>,
    ) -> Result<EventSet> {
        loop {
            let ready = self.ready(interest, deadline);
            if !ready.is_empty() {
                log::trace!("[stcp] wake {ready:?}");
                return Ok(ready);
            }

            let want_network = interest.contains(Event::NetworkData);
            let want_app = !self.close_requested && self.outgoing.len() < OUTGOING_CAP;

            tokio::select! {
                datagram = recv_datagram(&self.link), if want_network => {
                    self.inbound.push_back(datagram?);
                }
                request = self.from_app.recv(), if want_app => match request {
                    Some(AppRequest::Write(bytes)) => self.outgoing.extend(bytes),
                    // A dropped application handle is a close request.
                    Some(AppRequest::Close) | None => self.close_requested = true,
                },
                _ = sleep_until_deadline(deadline) => {}
            }
        }
    }

    async fn send_segment(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.link.send(bytes).await
    }

    fn receive_segment(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let datagram = self
            .inbound
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }

    fn read_from_app(&mut self, max_bytes: usize) -> Vec<u8> {
        let n = max_bytes.min(self.outgoing.len());
        self.outgoing.drain(..n).collect()
    }

    fn has_app_data(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn deliver_to_app(&mut self, bytes: &[u8]) {
        if self.to_app.send(AppEvent::Data(bytes.to_vec())).is_err() {
            log::debug!("[stcp] application reader gone; dropping {} bytes", bytes.len());
        }
    }

    fn notify_peer_closed(&mut self) {
        if self.to_app.send(AppEvent::PeerClosed).is_err() {
            log::debug!("[stcp] application reader gone; peer close not reported");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{pair, SimulatorConfig};
    use std::time::Duration;

    fn host() -> (
        ChannelHost<crate::simulator::SimLink>,
        crate::simulator::SimLink,
        mpsc::Sender<AppRequest>,
        mpsc::UnboundedReceiver<AppEvent>,
    ) {
        let (a, b) = pair(SimulatorConfig::default(), SimulatorConfig::default());
        let (req_tx, req_rx) = mpsc::channel(8);
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        (ChannelHost::new(a, req_rx, ev_tx), b, req_tx, ev_rx)
    }

    fn all() -> EventSet {
        Event::ALL.into_iter().collect()
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wakes_with_timeout() {
        let (mut host, _peer, _tx, _rx) = host();
        let deadline = Instant::now() + Duration::from_millis(250);
        let events = host.wait_for_event(all(), Some(deadline)).await.unwrap();
        assert!(events.contains(Event::Timeout));
        assert!(Instant::now() >= deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn datagram_is_signalled_and_received() {
        let (mut host, peer, _tx, _rx) = host();
        peer.send(b"datagram").await.unwrap();
        let events = host.wait_for_event(all(), None).await.unwrap();
        assert!(events.contains(Event::NetworkData));

        let mut buf = [0u8; 4];
        assert_eq!(host.receive_segment(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"data");
        assert!(host.receive_segment(&mut buf).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_signalled_while_writes_are_pending() {
        let (mut host, _peer, tx, _rx) = host();
        tx.send(AppRequest::Write(b"abc".to_vec())).await.unwrap();
        tx.send(AppRequest::Close).await.unwrap();

        // With the send window closed the engine only asks for the close.
        let events = host
            .wait_for_event(EventSet::from(Event::AppClose), None)
            .await
            .unwrap();
        assert_eq!(events, EventSet::from(Event::AppClose));
        assert!(host.has_app_data());

        assert_eq!(host.read_from_app(2), b"ab");
        assert_eq!(host.read_from_app(10), b"c");
        assert!(!host.has_app_data());
    }

    #[tokio::test(start_paused = true)]
    async fn uninterested_events_are_not_reported() {
        let (mut host, _peer, tx, _rx) = host();
        tx.send(AppRequest::Write(b"abc".to_vec())).await.unwrap();
        let interest = EventSet::from(Event::NetworkData);
        let deadline = Instant::now() + Duration::from_millis(10);
        let events = host.wait_for_event(interest, Some(deadline)).await.unwrap();
        assert_eq!(events, EventSet::from(Event::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_counts_as_close() {
        let (mut host, _peer, tx, _rx) = host();
        drop(tx);
        let events = host.wait_for_event(all(), None).await.unwrap();
        assert!(events.contains(Event::AppClose));
    }

    #[tokio::test]
    async fn delivery_and_peer_close_reach_application() {
        let (mut host, _peer, _tx, mut rx) = host();
        host.deliver_to_app(b"hi");
        host.notify_peer_closed();
        assert_eq!(rx.recv().await, Some(AppEvent::Data(b"hi".to_vec())));
        assert_eq!(rx.recv().await, Some(AppEvent::PeerClosed));
    }

    #[tokio::test]
    async fn gone_reader_is_tolerated() {
        let (mut host, _peer, _tx, rx) = host();
        drop(rx);
        host.deliver_to_app(b"lost");
        host.notify_peer_closed();
    }
}
