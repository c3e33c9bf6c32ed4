//! Entry point for `stcp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All protocol work is delegated to the library; `main.rs` owns only process
//! setup (logging, argument parsing) and stdin/stdout plumbing.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use stcp::{Config, Socket, StcpError, StcpStream};

/// Reliable byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Subcommand)]
enum Mode {
    /// Accept one connection and print everything received to stdout.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
    },
    /// Connect to a server, send stdin and print anything received.
    Client {
        /// Remote server address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        server: SocketAddr,
        /// Local address to bind.
        #[arg(long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
    },
}

#[derive(Args)]
struct Tuning {
    /// Largest payload per segment, in bytes.
    #[arg(long, global = true, default_value_t = 536)]
    mss: usize,
    /// Advertised receive window, in bytes.
    #[arg(long, global = true, default_value_t = 3072)]
    window: u16,
    /// Initial retransmission timeout, in milliseconds.
    #[arg(long, global = true, default_value_t = 1000)]
    rto_ms: u64,
    /// Retransmissions of one segment before giving up.
    #[arg(long, global = true, default_value_t = 6)]
    max_retries: u32,
    /// Wait for the peer to finish closing, in seconds.
    #[arg(long, global = true, default_value_t = 10)]
    close_timeout: u64,
}

impl Tuning {
    fn config(&self) -> Config {
        Config {
            mss: self.mss,
            local_window: self.window,
            initial_rto: Duration::from_millis(self.rto_ms),
            max_retries: self.max_retries,
            close_timeout: Duration::from_secs(self.close_timeout),
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.tuning.config();

    match cli.mode {
        Mode::Server { bind } => {
            log::info!("Starting server on {bind}");
            let socket = Socket::listen(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            let stream = StcpStream::accept(socket, config)
                .await
                .context("accepting connection")?;
            serve(stream).await
        }
        Mode::Client { server, bind } => {
            log::info!("Starting client, connecting to {server}");
            let socket = Socket::connect(bind, server)
                .await
                .with_context(|| format!("binding {bind}"))?;
            let stream = StcpStream::connect(socket, config)
                .await
                .with_context(|| format!("connecting to {server}"))?;
            client(stream).await
        }
    }
}

/// Copy the stream to stdout until the peer closes, then close our half.
async fn serve(mut stream: StcpStream) -> Result<()> {
    pump_to_stdout(&mut stream).await?;
    finish(stream).await
}

/// Send stdin while printing whatever arrives; close on stdin EOF.
async fn client(mut stream: StcpStream) -> Result<()> {
    let writer = stream.writer();
    let uploader = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = vec![0u8; 4096];
        loop {
            let n = stdin.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write(&buf[..n]).await?;
        }
        writer.shutdown().await?;
        anyhow::Ok(())
    });

    pump_to_stdout(&mut stream).await?;
    uploader.await.context("stdin task panicked")??;
    finish(stream).await
}

async fn pump_to_stdout(stream: &mut StcpStream) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(bytes) = stream.read().await? {
        stdout.write_all(&bytes).await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn finish(stream: StcpStream) -> Result<()> {
    match stream.close().await {
        Ok(()) => Ok(()),
        Err(err @ StcpError::CloseTimeout) => {
            log::warn!("{err}");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
