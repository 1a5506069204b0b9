//! Transfer frame definitions
//!
//! Every message of the transfer engine is one [`Frame`]: a one-byte tag followed by
//! big-endian fields. On a stream the frame is additionally prefixed with its length (see
//! [`crate::tcp`]); on UDP one datagram carries exactly one frame.
//!
//! ```text
//! META   | 0x01 | size: u64 |
//! OFFSET | 0x02 | offset: u64 |
//! DATA   | 0x03 | offset: u64 | payload ... |
//! ACK    | 0x04 | next: u64 |
//! ABORT  | 0x05 | reason (UTF-8) ... |
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tether_types::{Error, Result};

const TAG_META: u8 = 0x01;
const TAG_OFFSET: u8 = 0x02;
const TAG_DATA: u8 = 0x03;
const TAG_ACK: u8 = 0x04;
const TAG_ABORT: u8 = 0x05;

/// Largest frame either side will accept
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// One message of the transfer engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Sender announces the file size; starts (or restarts) a session
    Meta {
        /// File size in bytes
        size: u64,
    },
    /// Receiver announces how many bytes it already holds
    Offset {
        /// Offset the sender should continue from
        offset: u64,
    },
    /// A chunk of file content
    Data {
        /// Position of the first payload byte in the file
        offset: u64,
        /// File content
        payload: Vec<u8>,
    },
    /// Receiver confirms everything before `next`
    Ack {
        /// Next offset the receiver expects
        next: u64,
    },
    /// Either side gives up on the transfer
    Abort {
        /// Why the transfer was abandoned
        reason: String,
    },
}

impl Frame {
    /// Serialize the frame
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        match self {
            Self::Meta { size } => {
                buf.put_u8(TAG_META);
                buf.put_u64(*size);
            }
            Self::Offset { offset } => {
                buf.put_u8(TAG_OFFSET);
                buf.put_u64(*offset);
            }
            Self::Data { offset, payload } => {
                buf.put_u8(TAG_DATA);
                buf.put_u64(*offset);
                buf.put_slice(payload);
            }
            Self::Ack { next } => {
                buf.put_u8(TAG_ACK);
                buf.put_u64(*next);
            }
            Self::Abort { reason } => {
                buf.put_u8(TAG_ABORT);
                buf.put_slice(reason.as_bytes());
            }
        }
        buf.freeze()
    }

    /// Parse a frame; truncated or unknown frames are protocol errors
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if !data.has_remaining() {
            return Err(Error::protocol("empty frame"));
        }

        let tag = data.get_u8();
        let frame = match tag {
            TAG_META => Self::Meta {
                size: read_u64(&mut data, "META")?,
            },
            TAG_OFFSET => Self::Offset {
                offset: read_u64(&mut data, "OFFSET")?,
            },
            TAG_DATA => Self::Data {
                offset: read_u64(&mut data, "DATA")?,
                payload: data.to_vec(),
            },
            TAG_ACK => Self::Ack {
                next: read_u64(&mut data, "ACK")?,
            },
            TAG_ABORT => Self::Abort {
                reason: String::from_utf8_lossy(data).into_owned(),
            },
            other => return Err(Error::protocol(format!("unknown frame tag {:#04x}", other))),
        };

        Ok(frame)
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::Data { payload, .. } => 9 + payload.len(),
            Self::Abort { reason } => 1 + reason.len(),
            _ => 9,
        }
    }
}

fn read_u64(data: &mut &[u8], name: &str) -> Result<u64> {
    if data.remaining() < 8 {
        return Err(Error::protocol(format!("truncated {} frame", name)));
    }
    Ok(data.get_u64())
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meta { size } => write!(f, "META({})", size),
            Self::Offset { offset } => write!(f, "OFFSET({})", offset),
            Self::Data { offset, payload } => write!(f, "DATA({}, {} bytes)", offset, payload.len()),
            Self::Ack { next } => write!(f, "ACK({})", next),
            Self::Abort { reason } => write!(f, "ABORT({})", reason),
        }
    }
}
