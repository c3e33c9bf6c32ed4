//! `stcp`: a reliable, ordered, flow-controlled byte stream over an
//! unreliable datagram link.
//!
//! # Architecture
//!
//! ```text
//!   StcpStream  (application handle: write / read / close)
//!       │ channels
//!  ┌────▼──────────────────────────────────────┐
//!  │ Connection  (one task per connection)     │
//!  │   handshake ─▶ data transfer ─▶ teardown  │
//!  │   Context: SendWindow, Receiver,          │
//!  │            RetransmitQueue, Timer         │
//!  └────┬──────────────────────────────────────┘
//!       │ Host::wait_for_event / send_segment
//!  ┌────▼────────┐
//!  │ ChannelHost │──▶ Link: Socket (UDP) or SimLink (in-memory, lossy)
//!  └─────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`segment`]    : wire format (encode / decode)
//! - [`seq`]        : wraparound-safe sequence comparisons
//! - [`window`]     : send-window accounting
//! - [`sender`]     : retransmission queue
//! - [`receiver`]   : cumulative-ACK receive tracking
//! - [`timer`]      : adaptive retransmission timer
//! - [`state`]      : finite-state-machine types
//! - [`context`]    : per-connection state
//! - [`handshake`]  : connection open
//! - [`teardown`]   : connection close
//! - [`engine`]     : the per-connection event loop
//! - [`event`]      : wake reasons and event sets
//! - [`host`]       : collaborator traits and the channel-backed host
//! - [`stream`]     : application-facing stream handle
//! - [`socket`]     : UDP link
//! - [`simulator`]  : lossy/reordering in-memory link for testing
//! - [`config`]     : tunables
//! - [`error`]      : error taxonomy

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod handshake;
pub mod host;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod stream;
pub mod teardown;
pub mod timer;
pub mod window;

pub use config::Config;
pub use engine::Connection;
pub use error::{Result, StcpError};
pub use host::{ChannelHost, Host, Link};
pub use segment::{Flags, Segment};
pub use socket::Socket;
pub use state::ConnectionState;
pub use stream::{StcpStream, StcpWriter};
