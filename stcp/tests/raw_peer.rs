//! A hand-driven peer speaking raw segments to a real stream.
//!
//! These tests script the exact segments one side sends so sequence and
//! acknowledgement numbers can be checked on the wire.

use std::time::Duration;

use stcp::host::Link;
use stcp::segment::MAX_SEGMENT;
use stcp::simulator::{pair, SimLink, SimulatorConfig};
use stcp::{Config, Flags, Segment, StcpError, StcpStream};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Our ISN is 100 and the raw peer's is 499, so the stream expects peer
/// data from 500 on and sends its own from 101.
const PEER_DATA: u32 = 500;
const OUR_DATA: u32 = 101;

struct RawPeer {
    link: SimLink,
}

impl RawPeer {
    async fn recv(&self) -> Segment {
        let mut buf = [0u8; MAX_SEGMENT];
        let n = self.link.recv(&mut buf).await.unwrap();
        Segment::decode(&buf[..n]).unwrap()
    }

    async fn send(&self, seq: u32, ack: u32, flags: Flags, payload: &[u8]) {
        self.send_advertising(seq, ack, flags, 3072, payload).await;
    }

    async fn send_advertising(
        &self,
        seq: u32,
        ack: u32,
        flags: Flags,
        window: u16,
        payload: &[u8],
    ) {
        let seg = Segment::new(seq, ack, flags, window, payload.to_vec());
        self.link.send(&seg.encode()).await.unwrap();
    }
}

fn config() -> Config {
    Config {
        isn_range: 100..=100,
        ..Config::default()
    }
}

/// Open a stream actively against the raw peer.
async fn connect() -> (StcpStream, RawPeer) {
    connect_advertising(3072).await
}

/// As [`connect`], with the peer's SYN-ACK advertising `window`.
async fn connect_advertising(window: u16) -> (StcpStream, RawPeer) {
    let (link, raw) = pair(SimulatorConfig::default(), SimulatorConfig::default());
    let peer = RawPeer { link: raw };
    let client = tokio::spawn(StcpStream::connect(link, config()));

    let syn = peer.recv().await;
    assert!(syn.is_syn());
    peer.send_advertising(PEER_DATA - 1, OUR_DATA, Flags::SYN | Flags::ACK, window, &[])
        .await;
    let ack = peer.recv().await;
    assert_eq!(ack.header.ack, PEER_DATA);

    (client.await.unwrap().unwrap(), peer)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Scenario: a data segment's ACK is lost, the identical segment is resent,
/// and the late ACK advances the window exactly once.
#[tokio::test(start_paused = true)]
async fn unacked_segment_is_resent_identically() {
    let (stream, peer) = connect().await;
    stream.write(b"hello").await.unwrap();

    let original = peer.recv().await;
    assert_eq!(original.header.seq, OUR_DATA);
    assert_eq!(original.payload, b"hello");

    // The handshake's RTT sample was zero, so the RTO sits at its floor.
    let sent_at = Instant::now();
    let again = peer.recv().await;
    assert_eq!(again, original);
    assert!(sent_at.elapsed() >= config().min_rto);

    peer.send(PEER_DATA, OUR_DATA + 5, Flags::ACK, &[]).await;
    peer.send(PEER_DATA, OUR_DATA + 5, Flags::ACK, &[]).await;
    stream.write(b"next").await.unwrap();
    let next = peer.recv().await;
    assert_eq!(next.header.seq, OUR_DATA + 5);
    assert_eq!(next.payload, b"next");
}

/// Scenario: 600 arrives before 500; it is dropped and re-acked at 500, and
/// both are delivered in order once 600 is retransmitted.
#[tokio::test(start_paused = true)]
async fn out_of_order_segment_waits_for_retransmission() {
    let (mut stream, peer) = connect().await;
    let first = [b'a'; 100];
    let second = [b'b'; 100];

    peer.send(600, OUR_DATA, Flags::ACK, &second).await;
    assert_eq!(peer.recv().await.header.ack, 500);

    peer.send(500, OUR_DATA, Flags::ACK, &first).await;
    assert_eq!(peer.recv().await.header.ack, 600);
    assert_eq!(stream.read().await.unwrap().unwrap(), first);

    peer.send(600, OUR_DATA, Flags::ACK, &second).await;
    assert_eq!(peer.recv().await.header.ack, 700);
    assert_eq!(stream.read().await.unwrap().unwrap(), second);

    // A stale duplicate is re-acked but never delivered again.
    peer.send(500, OUR_DATA, Flags::ACK, &first).await;
    assert_eq!(peer.recv().await.header.ack, 700);
    peer.send(700, OUR_DATA, Flags::ACK | Flags::FIN, &[]).await;
    assert_eq!(peer.recv().await.header.ack, 701);
    assert_eq!(stream.read().await.unwrap(), None);
}

/// Scenario: active close. FIN(S), peer ACKs S+1, peer FIN, final ACK, and
/// the stream finishes well inside the close timeout.
#[tokio::test(start_paused = true)]
async fn graceful_active_close() {
    let (stream, peer) = connect().await;
    let start = Instant::now();
    let closing = tokio::spawn(stream.close());

    let fin = peer.recv().await;
    assert!(fin.is_fin());
    assert_eq!(fin.header.seq, OUR_DATA);

    peer.send(PEER_DATA, OUR_DATA + 1, Flags::ACK, &[]).await;
    peer.send(PEER_DATA, OUR_DATA + 1, Flags::FIN | Flags::ACK, &[])
        .await;
    let last = peer.recv().await;
    assert_eq!(last.header.flags, Flags::ACK);
    assert_eq!(last.header.ack, PEER_DATA + 1);

    // A retransmitted FIN during TIME_WAIT is acknowledged again.
    peer.send(PEER_DATA, OUR_DATA + 1, Flags::FIN | Flags::ACK, &[])
        .await;
    assert_eq!(peer.recv().await.header.ack, PEER_DATA + 1);

    closing.await.unwrap().unwrap();
    assert!(start.elapsed() < config().close_timeout);
}

/// Both FINs cross: FIN_WAIT -> CLOSING, then the ACK of our FIN finishes
/// the close.
#[tokio::test(start_paused = true)]
async fn simultaneous_close_through_closing() {
    let (stream, peer) = connect().await;
    let closing = tokio::spawn(stream.close());

    let fin = peer.recv().await;
    assert!(fin.is_fin());
    assert_eq!(fin.header.seq, OUR_DATA);

    // The peer's FIN does not yet acknowledge ours.
    peer.send(PEER_DATA, OUR_DATA, Flags::FIN | Flags::ACK, &[])
        .await;
    let ack = peer.recv().await;
    assert_eq!(ack.header.flags, Flags::ACK);
    assert_eq!(ack.header.seq, OUR_DATA + 1);
    assert_eq!(ack.header.ack, PEER_DATA + 1);

    peer.send(PEER_DATA + 1, OUR_DATA + 1, Flags::ACK, &[]).await;
    closing.await.unwrap().unwrap();
}

/// A close against a zero window is still seen: the FIN waits for a window
/// update instead of the close hanging.
#[tokio::test(start_paused = true)]
async fn close_against_zero_window_waits_for_update() {
    let (stream, peer) = connect_advertising(0).await;
    let closing = tokio::spawn(stream.close());

    let early = tokio::time::timeout(Duration::from_secs(1), peer.recv()).await;
    assert!(early.is_err(), "FIN sent into a zero window");

    peer.send(PEER_DATA, OUR_DATA, Flags::ACK, &[]).await;
    let fin = peer.recv().await;
    assert!(fin.is_fin());
    assert_eq!(fin.header.seq, OUR_DATA);

    peer.send(PEER_DATA, OUR_DATA + 1, Flags::FIN | Flags::ACK, &[])
        .await;
    assert_eq!(peer.recv().await.header.ack, PEER_DATA + 1);
    closing.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn close_against_zero_window_is_bounded() {
    let (stream, peer) = connect_advertising(0).await;
    let start = Instant::now();

    let err = stream.close().await.unwrap_err();
    assert!(matches!(err, StcpError::CloseTimeout));
    assert!(start.elapsed() >= config().close_timeout);
    drop(peer);
}

#[tokio::test(start_paused = true)]
async fn passive_close_waits_for_application() {
    let (mut stream, peer) = connect().await;

    peer.send(PEER_DATA, OUR_DATA, Flags::FIN | Flags::ACK, b"done")
        .await;
    assert_eq!(peer.recv().await.header.ack, PEER_DATA + 5);
    assert_eq!(stream.read().await.unwrap().unwrap(), b"done");
    assert_eq!(stream.read().await.unwrap(), None);

    // Half-closed: we can still send.
    stream.write(b"reply").await.unwrap();
    let reply = peer.recv().await;
    assert_eq!(reply.payload, b"reply");
    peer.send(PEER_DATA + 5, OUR_DATA + 5, Flags::ACK, &[]).await;

    let closing = tokio::spawn(stream.close());
    let fin = peer.recv().await;
    assert!(fin.is_fin());
    assert_eq!(fin.header.seq, OUR_DATA + 5);
    peer.send(PEER_DATA + 5, OUR_DATA + 6, Flags::ACK, &[]).await;
    closing.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn malformed_datagrams_are_ignored() {
    let (mut stream, peer) = connect().await;
    peer.link.send(&[0xff; 5]).await.unwrap();
    // Header length larger than the datagram.
    peer.link
        .send(&[0, 0, 1, 244, 0, 0, 0, 101, 40, 2, 12, 0])
        .await
        .unwrap();
    peer.send(PEER_DATA, OUR_DATA, Flags::ACK, b"fine").await;

    assert_eq!(stream.read().await.unwrap().unwrap(), b"fine");
    // Only the valid segment was acknowledged.
    assert_eq!(peer.recv().await.header.ack, PEER_DATA + 4);
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_data_exhausts_retries() {
    let (mut stream, peer) = connect().await;
    stream.write(b"into the void").await.unwrap();

    let err = stream.read().await.unwrap_err();
    assert!(matches!(err, StcpError::PeerUnresponsive { .. }));
    drop(peer);
}
