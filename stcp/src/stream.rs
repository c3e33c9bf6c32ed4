//! Application-facing byte stream.
//!
//! [`StcpStream`] spawns one engine task per connection and talks to it over
//! channels.  Opening resolves once the connection is ESTABLISHED, or with
//! the handshake error.
//!
//! ```ignore
//! let (a, b) = simulator::pair(SimulatorConfig::default(), SimulatorConfig::default());
//! let server = tokio::spawn(StcpStream::accept(b, Config::default()));
//! let client = StcpStream::connect(a, Config::default()).await?;
//! client.write(b"hello").await?;
//! client.close().await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::engine::Connection;
use crate::error::{Result, StcpError};
use crate::host::{AppEvent, AppRequest, ChannelHost, Link};

/// Writes queued towards the engine before `write` starts waiting.
const APP_CHANNEL_DEPTH: usize = 32;

/// A cloneable handle for the sending half of a stream.
#[derive(Debug, Clone)]
pub struct StcpWriter {
    tx: mpsc::Sender<AppRequest>,
    /// Shared by every clone: set by the first `shutdown`.
    shut_down: Arc<AtomicBool>,
}

impl StcpWriter {
    fn new(tx: mpsc::Sender<AppRequest>) -> Self {
        Self {
            tx,
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue `bytes` for transmission.
    pub async fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(StcpError::WriteAfterShutdown);
        }
        if bytes.is_empty() {
            return Ok(());
        }
        self.tx
            .send(AppRequest::Write(bytes.to_vec()))
            .await
            .map_err(|_| StcpError::ApplicationGone)
    }

    /// Close the sending half once everything written so far is sent.
    /// Does not wait for the peer; repeated calls do nothing.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.tx
            .send(AppRequest::Close)
            .await
            .map_err(|_| StcpError::ApplicationGone)
    }
}

/// A reliable, ordered byte stream to one peer.
#[derive(Debug)]
pub struct StcpStream {
    writer: StcpWriter,
    rx: mpsc::UnboundedReceiver<AppEvent>,
    engine: Option<JoinHandle<Result<()>>>,
    peer_closed: bool,
}

impl StcpStream {
    /// Active open over `link`.
    pub async fn connect<L: Link + 'static>(link: L, config: Config) -> Result<Self> {
        Self::open(link, config, true).await
    }

    /// Passive open: wait for a peer's SYN on `link`.
    pub async fn accept<L: Link + 'static>(link: L, config: Config) -> Result<Self> {
        Self::open(link, config, false).await
    }

    async fn open<L: Link + 'static>(link: L, config: Config, active: bool) -> Result<Self> {
        let (req_tx, req_rx) = mpsc::channel(APP_CHANNEL_DEPTH);
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let (open_tx, open_rx) = oneshot::channel();
        let host = ChannelHost::new(link, req_rx, ev_tx);

        let engine = tokio::spawn(async move {
            let mut conn = if active {
                Connection::connect(host, config).await?
            } else {
                Connection::accept(host, config).await?
            };
            let _ = open_tx.send(());
            conn.run().await
        });

        if open_rx.await.is_err() {
            // The engine finished without opening: its result is the reason.
            return Err(match join(engine).await {
                Err(err) => err,
                Ok(()) => StcpError::ApplicationGone,
            });
        }

        Ok(Self {
            writer: StcpWriter::new(req_tx),
            rx: ev_rx,
            engine: Some(engine),
            peer_closed: false,
        })
    }

    /// Another handle for writing, usable from a different task.
    pub fn writer(&self) -> StcpWriter {
        self.writer.clone()
    }

    pub async fn write(&self, bytes: &[u8]) -> Result<()> {
        self.writer.write(bytes).await
    }

    /// Close the sending half without waiting; reading stays possible.
    pub async fn shutdown(&self) -> Result<()> {
        self.writer.shutdown().await
    }

    /// The next chunk of received bytes, or `None` once the peer has
    /// finished sending.
    pub async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        if self.peer_closed {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(AppEvent::Data(bytes)) => Ok(Some(bytes)),
            Some(AppEvent::PeerClosed) => {
                self.peer_closed = true;
                Ok(None)
            }
            // The engine ended before the peer closed; report why.
            None => match self.engine.take() {
                Some(engine) => join(engine).await.map(|()| None),
                None => Ok(None),
            },
        }
    }

    /// Close our half and wait for the connection to finish.
    ///
    /// Returns [`StcpError::CloseTimeout`] if the peer never completed its
    /// half within the close timeout.
    pub async fn close(self) -> Result<()> {
        // The engine may already be gone; its result is what matters.
        let _ = self.writer.shutdown().await;
        drop(self.writer);
        match self.engine {
            Some(engine) => join(engine).await,
            None => Ok(()),
        }
    }
}

async fn join(engine: JoinHandle<Result<()>>) -> Result<()> {
    engine.await.map_err(|e| {
        log::warn!("[stcp] engine task failed: {e}");
        StcpError::ApplicationGone
    })?
}
