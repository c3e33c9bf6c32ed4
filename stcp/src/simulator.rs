//! In-memory network simulator for deterministic testing.
//!
//! Real networks drop, reorder, and duplicate datagrams.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`pair`] builds two connected [`SimLink`]s and applies a configurable
//! fault model to each direction independently:
//!
//! | Fault        | Description                                             |
//! |--------------|---------------------------------------------------------|
//! | Loss         | Drop a datagram with probability `loss_rate`.           |
//! | Scripted loss| Drop the n-th datagram sent (`drop_indices`, 0-based).  |
//! | Duplication  | Deliver a datagram twice with `duplicate_rate`.         |
//! | Reordering   | Hold a datagram back until the next one is sent.        |
//!
//! All randomness comes from a seeded [`StdRng`], so a failing run can be
//! reproduced exactly.

use std::collections::HashSet;
use std::io;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::host::Link;

/// Fault model for one direction of a simulated link.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a datagram is held back behind the next one.
    pub reorder_rate: f64,
    /// Indices (0-based, in send order) of datagrams to drop unconditionally.
    pub drop_indices: HashSet<u64>,
    /// RNG seed for the probabilistic faults.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults: a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            drop_indices: HashSet::new(),
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    /// A lossless direction that drops exactly the listed datagrams.
    pub fn dropping(indices: impl IntoIterator<Item = u64>) -> Self {
        Self {
            drop_indices: indices.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// Counters for one direction, readable from tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub sent: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

struct Outbound {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    config: SimulatorConfig,
    rng: StdRng,
    held: Option<Vec<u8>>,
    stats: SimStats,
}

impl Outbound {
    fn roll(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.rng.random_bool(probability.min(1.0))
    }

    fn deliver(&self, datagram: Vec<u8>) {
        // A vanished peer is just another lost datagram.
        let _ = self.tx.send(datagram);
    }

    fn send(&mut self, datagram: &[u8]) {
        let index = self.stats.sent;
        self.stats.sent += 1;

        let loss_rate = self.config.loss_rate;
        if self.config.drop_indices.contains(&index) || self.roll(loss_rate) {
            self.stats.dropped += 1;
            log::debug!("[sim] drop #{index} ({} bytes)", datagram.len());
            return;
        }

        let reorder_rate = self.config.reorder_rate;
        if self.held.is_none() && self.roll(reorder_rate) {
            self.stats.reordered += 1;
            log::debug!("[sim] hold #{index} for reordering");
            self.held = Some(datagram.to_vec());
            return;
        }

        self.deliver(datagram.to_vec());
        let duplicate_rate = self.config.duplicate_rate;
        if self.roll(duplicate_rate) {
            self.stats.duplicated += 1;
            log::debug!("[sim] duplicate #{index}");
            self.deliver(datagram.to_vec());
        }
        if let Some(held) = self.held.take() {
            self.deliver(held);
        }
    }
}

/// One endpoint of a simulated link.
pub struct SimLink {
    outbound: Mutex<Outbound>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl SimLink {
    /// Fault counters for datagrams sent from this endpoint.
    pub fn stats(&self) -> SimStats {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }
}

/// Build two connected endpoints; `a_to_b` shapes what `a` sends.
pub fn pair(a_to_b: SimulatorConfig, b_to_a: SimulatorConfig) -> (SimLink, SimLink) {
    let (tx_ab, rx_ab) = mpsc::unbounded_channel();
    let (tx_ba, rx_ba) = mpsc::unbounded_channel();

    let endpoint = |tx: mpsc::UnboundedSender<Vec<u8>>,
                    config: SimulatorConfig,
                    rx: mpsc::UnboundedReceiver<Vec<u8>>| SimLink {
        outbound: Mutex::new(Outbound {
            tx,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            held: None,
            stats: SimStats::default(),
        }),
        inbound: tokio::sync::Mutex::new(rx),
    };

    (endpoint(tx_ab, a_to_b, rx_ba), endpoint(tx_ba, b_to_a, rx_ab))
}

#[async_trait]
impl Link for SimLink {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(datagram);
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.lock().await;
        let Some(datagram) = inbound.recv().await else {
            // Like UDP, a vanished peer is silence, not an error.
            return std::future::pending().await;
        };
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }
}
