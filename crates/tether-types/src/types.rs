//! Core data types shared between the server and the transfer engine

use std::fmt;

/// Identity a client declares right after connecting.
///
/// The value is chosen by the peer, not assigned by the server, and travels as four bytes in
/// the sender's native byte order. Seeing the same identity twice in a row is what lets the
/// server treat a fresh connection as the continuation of an interrupted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientId(i32);

impl ClientId {
    /// Size of the identity on the wire
    pub const WIRE_SIZE: usize = 4;

    /// Create an identity from its integer value
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Get the integer value
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Decode the identity from its wire form
    pub const fn from_wire(bytes: [u8; Self::WIRE_SIZE]) -> Self {
        Self(i32::from_ne_bytes(bytes))
    }

    /// Encode the identity into its wire form
    pub const fn to_wire(self) -> [u8; Self::WIRE_SIZE] {
        self.0.to_ne_bytes()
    }
}

impl From<i32> for ClientId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a completed file transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransferStats {
    /// Size of the file in bytes
    pub total_bytes: u64,
    /// Bytes carried over the wire, including resent chunks
    pub bytes_sent: u64,
    /// Number of times the link was re-established mid-transfer
    pub reconnects: u32,
    /// Number of frames retransmitted after a read timeout
    pub retransmits: u32,
}

impl TransferStats {
    /// Create empty statistics for a file of the given size
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            ..Self::default()
        }
    }

    /// Whether the transfer survived at least one reconnection
    pub fn was_resumed(&self) -> bool {
        self.reconnects > 0
    }
}
