//! Connected clients

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use tether_types::ClientId;

/// Socket handle a client is keyed by while it is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientHandle(RawFd);

impl ClientHandle {
    /// Raw descriptor behind the handle
    pub const fn raw(self) -> RawFd {
        self.0
    }
}

impl From<RawFd> for ClientHandle {
    fn from(fd: RawFd) -> Self {
        Self(fd)
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a read error means the peer is gone for good.
///
/// Timeouts and other transient failures leave the connection usable.
pub(crate) fn is_hang_up(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// One connected client
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    handle: ClientHandle,
    identity: ClientId,
    peer: SocketAddr,
    blocking: bool,
    hung_up: bool,
    serial: u64,
}

impl Client {
    /// Wrap an accepted stream; the client starts parked in non-blocking mode
    pub fn new(
        stream: TcpStream,
        identity: ClientId,
        peer: SocketAddr,
        serial: u64,
    ) -> io::Result<Self> {
        let handle = ClientHandle(stream.as_raw_fd());
        let mut client = Self {
            stream,
            handle,
            identity,
            peer,
            blocking: true,
            hung_up: false,
            serial,
        };
        client.set_blocking(false)?;
        Ok(client)
    }

    /// Handle of the client
    pub fn handle(&self) -> ClientHandle {
        self.handle
    }

    /// Identity the client declared on connect
    pub fn identity(&self) -> ClientId {
        self.identity
    }

    /// Address of the peer
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the socket is in blocking mode
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Whether the peer closed its end
    pub fn is_hung_up(&self) -> bool {
        self.hung_up
    }

    /// Admission order; later clients have larger serials
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub(crate) fn mark_hung_up(&mut self) {
        self.hung_up = true;
    }

    /// Switch the socket between blocking and non-blocking mode
    pub fn set_blocking(&mut self, blocking: bool) -> io::Result<()> {
        self.stream.set_nonblocking(!blocking)?;
        self.blocking = blocking;
        Ok(())
    }

    /// Read one line, byte by byte so that nothing past the terminator is consumed.
    ///
    /// Stops after the LF or after `max_len` bytes, whichever comes first. Returns `None`
    /// when the peer closed the connection before sending anything.
    pub fn read_line(&mut self, max_len: usize) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        while line.len() < max_len {
            match self.stream.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok((!line.is_empty()).then_some(line))
    }

    /// Read a single byte
    pub fn read_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        self.stream.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Send raw bytes
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }

    /// Shut the connection down in both directions
    pub fn shutdown(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }

    /// Independent handle to the same socket
    pub fn try_clone_stream(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    /// Bound blocking reads; `None` blocks indefinitely
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }
}
