//! Seams between the server core and the transfer engine
//!
//! The engine never sees sockets directly: it moves frames over a [`Channel`] and, when the
//! channel breaks, asks a [`Reconnect`] capability for a replacement. The server decides what
//! "the same client came back" means; the engine only decides when to ask.

use crate::{Result, TransferStats};
use std::path::Path;
use std::time::Duration;

/// A bidirectional, frame-oriented link to one peer
pub trait Channel {
    /// Send one frame
    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Block until one frame arrives
    fn recv_frame(&mut self) -> Result<Vec<u8>>;

    /// Bound subsequent [`Channel::recv_frame`] calls; `None` blocks indefinitely
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;

    /// Short human-readable description of the peer, used in logs
    fn describe(&self) -> String;
}

/// Capability handed to the transfer engine for re-establishing a broken link
pub trait Reconnect {
    /// Wait up to `timeout` for the peer to come back.
    ///
    /// Returns the channel to continue on, or `None` when the transfer must be abandoned.
    fn reconnect(&mut self, timeout: Duration) -> Option<Box<dyn Channel>>;
}

/// Byte-level file transfer over a [`Channel`]
pub trait TransferEngine {
    /// Send the file at `path` to the peer
    fn send_file(
        &self,
        channel: Box<dyn Channel>,
        path: &Path,
        reconnect: &mut dyn Reconnect,
    ) -> Result<TransferStats>;

    /// Receive a file from the peer and store it at `path`
    fn receive_file(
        &self,
        channel: Box<dyn Channel>,
        path: &Path,
        reconnect: &mut dyn Reconnect,
    ) -> Result<TransferStats>;
}

/// A [`Reconnect`] that never reconnects
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReconnect;

impl Reconnect for NoReconnect {
    fn reconnect(&mut self, _timeout: Duration) -> Option<Box<dyn Channel>> {
        None
    }
}
