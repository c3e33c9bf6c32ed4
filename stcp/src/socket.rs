//! UDP datagram link.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that talks to
//! exactly one peer.  All protocol logic lives elsewhere; this module owns
//! only byte I/O.

use std::io;
use std::net::SocketAddr;
use std::sync::OnceLock;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::host::Link;

/// A UDP socket bound to one peer.
///
/// A socket built with [`Socket::listen`] learns its peer from the first
/// datagram it receives; datagrams from any other address are ignored.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    peer: OnceLock<SocketAddr>,
    inner: UdpSocket,
}

impl Socket {
    /// Bind to `local_addr` and talk to `peer`.
    pub async fn connect(local_addr: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let socket = Self::listen(local_addr).await?;
        let _ = socket.peer.set(peer);
        Ok(socket)
    }

    /// Bind to `local_addr` and wait for a peer to show up.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn listen(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            peer: OnceLock::new(),
            inner,
        })
    }

    /// The peer address, once known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer.get().copied()
    }
}

/// Returns true if the error says something about one datagram, not the socket.
fn is_transient_io_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

#[async_trait]
impl Link for Socket {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        let Some(peer) = self.peer() else {
            // Nothing to talk to yet; an unreliable link may drop this.
            log::debug!("[udp] no peer yet; dropping {} bytes", datagram.len());
            return Ok(());
        };
        match self.inner.send_to(datagram, peer).await {
            Ok(_) => Ok(()),
            Err(e) if is_transient_io_error(&e) => {
                log::debug!("[udp] send to {peer} failed: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let (n, from) = match self.inner.recv_from(buf).await {
                Ok(v) => v,
                Err(e) if is_transient_io_error(&e) => {
                    log::debug!("[udp] recv error ignored: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let peer = *self.peer.get_or_init(|| {
                log::info!("[udp] peer is {from}");
                from
            });
            if from == peer {
                return Ok(n);
            }
            log::debug!("[udp] ignoring datagram from stranger {from}");
        }
    }
}
