//! End-to-end data transfer and teardown over the in-memory simulator.
//!
//! Everything runs on paused time, so retransmission timeouts cost nothing
//! and every run with the same seeds is identical.

use stcp::simulator::{pair, SimulatorConfig};
use stcp::{Config, StcpError, StcpStream};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(isn: u32) -> Config {
    Config {
        isn_range: isn..=isn,
        ..Config::default()
    }
}

/// A deterministic payload that makes misordering visible.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn read_to_end(stream: &mut StcpStream) -> Result<Vec<u8>, StcpError> {
    let mut received = Vec::new();
    while let Some(bytes) = stream.read().await? {
        received.extend_from_slice(&bytes);
    }
    Ok(received)
}

async fn open(a_to_b: SimulatorConfig, b_to_a: SimulatorConfig) -> (StcpStream, StcpStream) {
    let (a, b) = pair(a_to_b, b_to_a);
    let server = tokio::spawn(StcpStream::accept(b, config(5000)));
    let client = StcpStream::connect(a, config(u32::MAX - 1000)).await.unwrap();
    let server = server.await.unwrap().unwrap();
    (client, server)
}

/// Send `payload` from client to server, then close both halves and return
/// what the server read.
async fn upload(client: StcpStream, mut server: StcpStream, payload: Vec<u8>) -> Vec<u8> {
    let sender = tokio::spawn(async move {
        client.write(&payload).await?;
        client.close().await
    });
    let received = read_to_end(&mut server).await.unwrap();
    server.close().await.unwrap();
    sender.await.unwrap().unwrap();
    received
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn clean_link_transfers_in_order() {
    let (client, server) = open(SimulatorConfig::default(), SimulatorConfig::default()).await;
    // The client ISN sits just below the wrap point, so this crosses it.
    let payload = pattern(10_000);
    assert_eq!(upload(client, server, payload.clone()).await, payload);
}

#[tokio::test(start_paused = true)]
async fn both_directions_at_once() {
    let (mut client, mut server) =
        open(SimulatorConfig::default(), SimulatorConfig::default()).await;
    let up = pattern(4000);
    let down: Vec<u8> = pattern(5000).into_iter().rev().collect();

    client.write(&up).await.unwrap();
    server.write(&down).await.unwrap();
    client.shutdown().await.unwrap();
    server.shutdown().await.unwrap();

    let from_client = read_to_end(&mut server).await.unwrap();
    let from_server = read_to_end(&mut client).await.unwrap();
    assert_eq!(from_client, up);
    assert_eq!(from_server, down);

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn scripted_data_loss_is_retransmitted() {
    // Datagrams 0 and 1 are the SYN and the handshake ACK; drop two data
    // segments and one ACK in the other direction.
    let (client, server) = open(
        SimulatorConfig::dropping([3, 5]),
        SimulatorConfig::dropping([2]),
    )
    .await;
    let payload = pattern(6000);
    assert_eq!(upload(client, server, payload.clone()).await, payload);
}

#[tokio::test(start_paused = true)]
async fn lossy_duplicating_reordering_link() {
    let faults = |seed| SimulatorConfig {
        loss_rate: 0.05,
        duplicate_rate: 0.05,
        reorder_rate: 0.05,
        seed,
        ..SimulatorConfig::default()
    };
    let (client, server) = open(faults(1), faults(2)).await;
    let payload = pattern(20_000);
    assert_eq!(upload(client, server, payload.clone()).await, payload);
}

#[tokio::test(start_paused = true)]
async fn small_window_still_delivers_everything() {
    let (a, b) = pair(SimulatorConfig::default(), SimulatorConfig::default());
    let small = Config {
        local_window: 700,
        mss: 300,
        ..config(9)
    };
    let server = tokio::spawn(StcpStream::accept(b, small));
    let client = StcpStream::connect(a, config(1)).await.unwrap();
    let server = server.await.unwrap().unwrap();

    let payload = pattern(7000);
    assert_eq!(upload(client, server, payload.clone()).await, payload);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_stream_closes_it() {
    let (client, mut server) = open(SimulatorConfig::default(), SimulatorConfig::default()).await;
    client.write(b"last words").await.unwrap();
    drop(client);

    assert_eq!(read_to_end(&mut server).await.unwrap(), b"last words");
    server.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn peer_that_never_closes_hits_close_timeout() {
    let (client, mut server) = open(SimulatorConfig::default(), SimulatorConfig::default()).await;
    let start = tokio::time::Instant::now();
    let closing = tokio::spawn(client.close());

    // The server sees the end of the stream but never closes its half.
    assert_eq!(server.read().await.unwrap(), None);

    let err = closing.await.unwrap().unwrap_err();
    assert!(matches!(err, StcpError::CloseTimeout));
    assert!(!err.is_fatal());
    assert!(start.elapsed() >= Config::default().close_timeout);
    drop(server);
}
