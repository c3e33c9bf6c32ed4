//! Wire-format definitions for STCP segments.
//!
//! Every datagram exchanged between peers is a [`Segment`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`], returning errors
//!   for malformed or truncated input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Header Len   |     Flags     |        Advertised Window      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             (header extension, header_len - 12 bytes)         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! `header_len` counts header bytes, so a peer may append extension bytes
//! that this implementation skips.  Segments produced here always carry
//! exactly [`HEADER_LEN`] header bytes.  The payload is everything after the
//! header; checksums are the link's business, not ours.

use std::fmt;

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 12;

/// Largest payload a single segment may carry.
pub const MAX_PAYLOAD: usize = 536;

/// Largest datagram a peer may send us.
pub const MAX_SEGMENT: usize = u8::MAX as usize + MAX_PAYLOAD;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_HEADER_LEN: usize = 8;
const OFF_FLAGS: usize = 9;
const OFF_WINDOW: usize = 10;

/// Set of control flags carried by a segment.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u8);

impl Flags {
    /// Synchronise sequence numbers (connection open).
    pub const SYN: Flags = Flags(0x1);
    /// Acknowledgement field is valid.
    pub const ACK: Flags = Flags(0x2);
    /// Sender has no more data to send.
    pub const FIN: Flags = Flags(0x4);

    const ALL: u8 = 0x7;

    /// The empty flag set.
    pub const fn empty() -> Self {
        Flags(0)
    }

    /// Build a flag set from wire bits, rejecting bits this protocol does not define.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL == 0 {
            Some(Flags(bits))
        } else {
            None
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// `true` when every flag in `other` is also set in `self`.
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        let mut sep = "";
        for (flag, name) in [(Flags::SYN, "SYN"), (Flags::ACK, "ACK"), (Flags::FIN, "FIN")] {
            if self.contains(flag) {
                write!(f, "{sep}{name}")?;
                sep = "|";
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({self})")
    }
}

/// Fixed-size segment header, in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Sequence number of the first byte this segment occupies.
    pub seq: u32,
    /// Next sequence number expected from the peer (valid when `ACK` is set).
    pub ack: u32,
    pub flags: Flags,
    /// Advertised receive window in bytes.
    pub window: u16,
}

/// A complete protocol segment: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn new(seq: u32, ack: u32, flags: Flags, window: u16, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD);
        Segment {
            header: Header {
                seq,
                ack,
                flags,
                window,
            },
            payload,
        }
    }

    pub fn is_syn(&self) -> bool {
        self.header.flags.contains(Flags::SYN)
    }

    pub fn is_ack(&self) -> bool {
        self.header.flags.contains(Flags::ACK)
    }

    pub fn is_fin(&self) -> bool {
        self.header.flags.contains(Flags::FIN)
    }

    /// `false` for a flagless, empty segment, which must never be sent.
    pub fn carries_information(&self) -> bool {
        !self.header.flags.is_empty() || !self.payload.is_empty()
    }

    /// Number of sequence numbers this segment occupies.
    ///
    /// SYN and FIN each consume one, exactly like a byte of payload.
    pub fn seq_len(&self) -> u32 {
        let mut len = self.payload.len() as u32;
        if self.is_syn() {
            len += 1;
        }
        if self.is_fin() {
            len += 1;
        }
        len
    }

    /// First sequence number after this segment.
    pub fn seq_end(&self) -> u32 {
        self.header.seq.wrapping_add(self.seq_len())
    }

    /// Serialise this segment into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.carries_information(), "encoding an empty segment");
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.header.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.header.ack.to_be_bytes());
        buf[OFF_HEADER_LEN] = HEADER_LEN as u8;
        buf[OFF_FLAGS] = self.header.flags.bits();
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&self.header.window.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        buf
    }

    /// Parse a [`Segment`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the declared header length is below [`HEADER_LEN`] or exceeds `buf.len()`,
    /// - the payload is longer than [`MAX_PAYLOAD`],
    /// - undefined flag bits are set, or
    /// - the segment has neither flags nor payload.
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::Truncated { len: buf.len() });
        }

        let header_len = buf[OFF_HEADER_LEN] as usize;
        if header_len < HEADER_LEN || header_len > buf.len() {
            return Err(SegmentError::HeaderLength {
                declared: header_len,
                received: buf.len(),
            });
        }

        let payload = &buf[header_len..];
        if payload.len() > MAX_PAYLOAD {
            return Err(SegmentError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let flags = Flags::from_bits(buf[OFF_FLAGS])
            .ok_or(SegmentError::UnknownFlags(buf[OFF_FLAGS]))?;

        let segment = Segment {
            header: Header {
                seq: read_u32(buf, OFF_SEQ),
                ack: read_u32(buf, OFF_ACK),
                flags,
                window: u16::from_be_bytes([buf[OFF_WINDOW], buf[OFF_WINDOW + 1]]),
            },
            payload: payload.to_vec(),
        };

        if !segment.carries_information() {
            return Err(SegmentError::Empty);
        }
        Ok(segment)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] seq={} ack={} win={} len={}",
            self.header.flags,
            self.header.seq,
            self.header.ack,
            self.header.window,
            self.payload.len()
        )
    }
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("buffer of {len} bytes too short to contain a header")]
    Truncated { len: usize },
    #[error("declared header length {declared} inconsistent with {received} received bytes")]
    HeaderLength { declared: usize, received: usize },
    #[error("payload of {len} bytes exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("undefined flag bits set: {0:#04x}")]
    UnknownFlags(u8),
    #[error("segment carries neither flags nor payload")]
    Empty,
}
