//! Client side of the reconnection protocol
//!
//! A client that loses its link mid-transfer dials the server again and declares the same
//! identity it used before. These [`Reconnect`] implementations do exactly that, so a
//! client-side [`crate::ChunkedEngine`] resumes transparently.

use crate::tcp::{handshake, TcpChannel};
use crate::udp::{UdpChannel, RENDEZVOUS_SIGNAL};
use std::io;
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::{Duration, Instant};
use tether_types::{Channel, ClientId, Reconnect};
use tracing::{debug, warn};

/// Connect to the server and declare `id`
pub fn connect(addr: SocketAddr, id: ClientId) -> io::Result<TcpStream> {
    let mut stream = TcpStream::connect(addr)?;
    handshake(&mut stream, id)?;
    Ok(stream)
}

/// Tell the server's UDP socket where this client's datagrams come from
pub fn rendezvous(socket: &UdpSocket, server: SocketAddr) -> io::Result<()> {
    socket.send_to(&[RENDEZVOUS_SIGNAL], server).map(|_| ())
}

/// Redials the server over TCP with the same identity
#[derive(Debug)]
pub struct TcpRedialer {
    addr: SocketAddr,
    identity: ClientId,
    stream: Option<TcpStream>,
}

impl TcpRedialer {
    /// Redial `addr` declaring `identity`
    pub fn new(addr: SocketAddr, identity: ClientId) -> Self {
        Self {
            addr,
            identity,
            stream: None,
        }
    }

    /// The most recent replacement connection, if a reconnection happened
    pub fn take_stream(&mut self) -> Option<TcpStream> {
        self.stream.take()
    }

    fn redial(&self, timeout: Duration) -> io::Result<(TcpStream, TcpChannel)> {
        let mut stream = TcpStream::connect_timeout(&self.addr, timeout)?;
        handshake(&mut stream, self.identity)?;
        let channel = TcpChannel::new(stream.try_clone()?)?;
        Ok((stream, channel))
    }
}

impl Reconnect for TcpRedialer {
    fn reconnect(&mut self, timeout: Duration) -> Option<Box<dyn Channel>> {
        match self.redial(timeout) {
            Ok((stream, channel)) => {
                debug!("Redialed {} as {}", self.addr, self.identity);
                self.stream = Some(stream);
                Some(Box::new(channel))
            }
            Err(e) => {
                warn!("Redialing {} failed: {}", self.addr, e);
                None
            }
        }
    }
}

/// Pause between repeated UDP identity announcements
const ANNOUNCE_INTERVAL: Duration = Duration::from_millis(250);

/// Re-announces the identity to the server's UDP socket and waits for the echo
#[derive(Debug)]
pub struct UdpRedialer {
    socket: UdpSocket,
    server: SocketAddr,
    identity: ClientId,
}

impl UdpRedialer {
    /// Announce `identity` from `socket` to `server`
    pub fn new(socket: UdpSocket, server: SocketAddr, identity: ClientId) -> Self {
        Self {
            socket,
            server,
            identity,
        }
    }

    /// Announce until the server echoes the identity back or `timeout` runs out.
    ///
    /// The server may still be busy retransmitting on the old link and swallow the first
    /// announcements, so they are repeated every [`ANNOUNCE_INTERVAL`].
    fn announce(&self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut next_announce = Instant::now();

        let mut buf = [0u8; 64];
        loop {
            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            if remaining.is_zero() {
                return Ok(false);
            }
            if now >= next_announce {
                self.socket.send_to(&self.identity.to_wire(), self.server)?;
                next_announce = now + ANNOUNCE_INTERVAL;
            }
            let wait = remaining.min(next_announce.saturating_duration_since(now));
            self.socket.set_read_timeout(Some(wait.max(Duration::from_millis(1))))?;

            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    continue
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            // Stale transfer frames may still be queued ahead of the echo
            if from == self.server && len == ClientId::WIRE_SIZE {
                let mut wire = [0u8; ClientId::WIRE_SIZE];
                wire.copy_from_slice(&buf[..len]);
                return Ok(ClientId::from_wire(wire) == self.identity);
            }
        }
    }
}

impl Reconnect for UdpRedialer {
    fn reconnect(&mut self, timeout: Duration) -> Option<Box<dyn Channel>> {
        let announced = self.announce(timeout);
        let _ = self.socket.set_read_timeout(None);

        match announced {
            Ok(true) => {
                let socket = self.socket.try_clone().ok()?;
                debug!("Server {} acknowledged {}", self.server, self.identity);
                Some(Box::new(UdpChannel::new(socket, self.server)))
            }
            Ok(false) => {
                warn!("Server {} did not acknowledge {}", self.server, self.identity);
                None
            }
            Err(e) => {
                warn!("Re-announcing to {} failed: {}", self.server, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::{bind_listener, read_identity};

    #[test]
    fn test_tcp_redial_declares_identity() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 4).unwrap();
        let mut redialer = TcpRedialer::new(listener.local_addr().unwrap(), ClientId::new(7));

        let channel = redialer.reconnect(Duration::from_secs(2));
        let (mut accepted, _) = listener.accept().unwrap();

        assert!(channel.is_some());
        assert_eq!(read_identity(&mut accepted).unwrap(), ClientId::new(7));
        assert!(redialer.take_stream().is_some());
    }

    #[test]
    fn test_tcp_redial_refused() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 4).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut redialer = TcpRedialer::new(addr, ClientId::new(7));
        assert!(redialer.reconnect(Duration::from_millis(200)).is_none());
    }

    #[test]
    fn test_udp_redial_waits_for_echo() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let echo = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            let (len, from) = server.recv_from(&mut buf).unwrap();
            server.send_to(b"stale frame", from).unwrap();
            server.send_to(&buf[..len], from).unwrap();
        });

        let mut redialer = UdpRedialer::new(client, server_addr, ClientId::new(11));
        assert!(redialer.reconnect(Duration::from_secs(2)).is_some());
        echo.join().unwrap();
    }

    #[test]
    fn test_udp_redial_repeats_announcement() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        // The first announcement is lost to a server still busy with the old link
        let echo = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            let (first, _) = server.recv_from(&mut buf).unwrap();
            let (len, from) = server.recv_from(&mut buf).unwrap();
            server.send_to(&buf[..len], from).unwrap();
            (first, len)
        });

        let mut redialer = UdpRedialer::new(client, server_addr, ClientId::new(11));
        assert!(redialer.reconnect(Duration::from_secs(2)).is_some());
        assert_eq!(
            echo.join().unwrap(),
            (ClientId::WIRE_SIZE, ClientId::WIRE_SIZE)
        );
    }

    #[test]
    fn test_udp_redial_times_out() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();

        let mut redialer =
            UdpRedialer::new(client, server.local_addr().unwrap(), ClientId::new(11));
        assert!(redialer.reconnect(Duration::from_millis(50)).is_none());
    }
}
