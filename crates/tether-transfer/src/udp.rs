//! UDP plumbing: one datagram carries one frame

use crate::frame::MAX_FRAME_LEN;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tether_types::{Channel, ClientId, Error, Result};
use tracing::trace;

/// Byte a client sends to the UDP socket so the server learns its datagram address
pub const RENDEZVOUS_SIGNAL: u8 = b'R';

/// Bind the UDP socket shared by all datagram transfers
pub fn bind_udp(addr: SocketAddr) -> io::Result<UdpSocket> {
    UdpSocket::bind(addr)
}

/// Frame channel to one peer over a (possibly shared) UDP socket
#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
    peer: SocketAddr,
    buf: Vec<u8>,
}

impl UdpChannel {
    /// Talk to `peer` over `socket`; datagrams from anyone else are dropped
    pub fn new(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer,
            buf: vec![0u8; MAX_FRAME_LEN.min(u16::MAX as usize)],
        }
    }
}

impl Channel for UdpChannel {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.socket
            .send_to(frame, self.peer)
            .map(|_| ())
            .map_err(|e| Error::from_link(&e))
    }

    fn recv_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            let (len, from) = self
                .socket
                .recv_from(&mut self.buf)
                .map_err(|e| Error::from_link(&e))?;

            if from != self.peer {
                trace!("Dropping {} byte datagram from stranger {}", len, from);
            } else if len == ClientId::WIRE_SIZE {
                // A reconnecting peer repeats its identity until it hears back
                trace!("Dropping identity announcement from {}", from);
            } else {
                return Ok(self.buf[..len].to_vec());
            }
        }
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.socket
            .set_read_timeout(timeout)
            .map_err(|e| Error::from_link(&e))
    }

    fn describe(&self) -> String {
        format!("udp://{}", self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> UdpSocket {
        bind_udp("127.0.0.1:0".parse().unwrap()).unwrap()
    }

    #[test]
    fn test_datagram_is_one_frame() {
        let a = loopback();
        let b = loopback();
        let mut to_b = UdpChannel::new(a.try_clone().unwrap(), b.local_addr().unwrap());
        let mut from_a = UdpChannel::new(b, a.local_addr().unwrap());

        to_b.send_frame(b"first").unwrap();
        to_b.send_frame(b"second").unwrap();

        assert_eq!(from_a.recv_frame().unwrap(), b"first");
        assert_eq!(from_a.recv_frame().unwrap(), b"second");
    }

    #[test]
    fn test_strangers_are_ignored() {
        let server = loopback();
        let peer = loopback();
        let stranger = loopback();
        let server_addr = server.local_addr().unwrap();
        let mut channel = UdpChannel::new(server, peer.local_addr().unwrap());

        stranger.send_to(b"noise", server_addr).unwrap();
        peer.send_to(b"signal", server_addr).unwrap();

        assert_eq!(channel.recv_frame().unwrap(), b"signal");
    }

    #[test]
    fn test_identity_announcements_are_not_frames() {
        let server = loopback();
        let peer = loopback();
        let server_addr = server.local_addr().unwrap();
        let mut channel = UdpChannel::new(server, peer.local_addr().unwrap());

        peer.send_to(&ClientId::new(5).to_wire(), server_addr).unwrap();
        peer.send_to(b"frame", server_addr).unwrap();

        assert_eq!(channel.recv_frame().unwrap(), b"frame");
    }

    #[test]
    fn test_read_timeout() {
        let server = loopback();
        let mut channel = UdpChannel::new(server, "127.0.0.1:9".parse().unwrap());
        channel
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();

        assert!(matches!(channel.recv_frame().unwrap_err(), Error::Timeout));
    }
}
