//! Bringing an interrupted client back mid-transfer
//!
//! The transfer engine calls into these when its link breaks. Both paths wait, bounded by
//! the engine's reconnection timeout, for a client to announce an identity, record that
//! identity in the history, and resume only if it repeats the previous one. A client that
//! arrives with another identity is kept (it is a regular new client); only the transfer is
//! given up.

use crate::client::ClientHandle;
use crate::state::ServerState;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};
use tether_transfer::{wait_readable, TcpChannel, UdpChannel};
use tether_types::{Channel, ClientId, Reconnect};
use tracing::{info, trace, warn};

/// Smallest receive timeout the UDP path arms; a zero timeout would mean "block forever"
const MIN_UDP_TIMEOUT: Duration = Duration::from_millis(1);

/// Waits on the listening socket for the lost client to connect again
pub struct TcpReconnector<'a> {
    state: &'a mut ServerState,
    resumed: Option<ClientHandle>,
}

impl<'a> TcpReconnector<'a> {
    /// Reconnect through the listener of `state`
    pub fn new(state: &'a mut ServerState) -> Self {
        Self {
            state,
            resumed: None,
        }
    }

    /// The client the transfer continued on, if it resumed at least once
    pub fn resumed(&self) -> Option<ClientHandle> {
        self.resumed
    }

    fn wait_for_client(&mut self, timeout: Duration) -> Option<ClientHandle> {
        let listener = &self.state.listener;

        if let Err(e) = listener.set_nonblocking(true) {
            warn!("Cannot arm the listener for reconnection: {}", e);
            return None;
        }

        match wait_readable(listener.as_raw_fd(), timeout) {
            Ok(true) => {}
            Ok(false) => {
                let _ = listener.set_nonblocking(false);
                info!("No client came back within {:?}", timeout);
                return None;
            }
            Err(e) => {
                let _ = listener.set_nonblocking(false);
                warn!("Waiting for the client to come back failed: {}", e);
                return None;
            }
        }

        if let Err(e) = listener.set_nonblocking(false) {
            warn!("Cannot restore the listener to blocking mode: {}", e);
            return None;
        }

        self.state.accept_new_client()
    }

    fn resume_on(&mut self, handle: ClientHandle) -> io::Result<TcpChannel> {
        let client = self
            .state
            .registry
            .get_mut(handle)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "client vanished"))?;

        client.set_blocking(true)?;
        TcpChannel::new(client.try_clone_stream()?)
    }
}

impl Reconnect for TcpReconnector<'_> {
    fn reconnect(&mut self, timeout: Duration) -> Option<Box<dyn Channel>> {
        let handle = self.wait_for_client(timeout)?;

        if !self.state.history.is_resumption() {
            warn!(
                "Client {} is not the one that was lost (history {:?}); abandoning transfer",
                handle,
                self.state.history.entries()
            );
            return None;
        }

        match self.resume_on(handle) {
            Ok(channel) => {
                info!("Transfer resumes on client {}", handle);
                self.resumed = Some(handle);
                Some(Box::new(channel))
            }
            Err(e) => {
                warn!("Cannot resume on client {}: {}", handle, e);
                None
            }
        }
    }
}

/// Waits on the shared UDP socket for the lost client to re-announce itself
pub struct UdpReconnector<'a> {
    state: &'a mut ServerState,
}

impl<'a> UdpReconnector<'a> {
    /// Reconnect through the UDP socket of `state`
    pub fn new(state: &'a mut ServerState) -> Self {
        Self { state }
    }
}

impl Reconnect for UdpReconnector<'_> {
    fn reconnect(&mut self, timeout: Duration) -> Option<Box<dyn Channel>> {
        let udp = &self.state.udp;
        let announced =
            receive_identity(udp, timeout.max(MIN_UDP_TIMEOUT)).and_then(|found| match found {
                Some((id, peer)) => udp
                    .send_to(&id.to_wire(), peer)
                    .map(|_| Some((id, peer))),
                None => Ok(None),
            });

        let (id, peer) = match announced {
            Ok(Some(announced)) => announced,
            Ok(None) => {
                let _ = udp.set_read_timeout(None);
                info!("No identity arrived over UDP within {:?}", timeout);
                return None;
            }
            Err(e) => {
                let _ = udp.set_read_timeout(None);
                warn!("Waiting for a UDP identity failed: {}", e);
                return None;
            }
        };

        self.state.register_new_client_id(id);

        if let Err(e) = self.state.udp.set_read_timeout(None) {
            warn!("Cannot disarm the UDP receive timeout: {}", e);
            return None;
        }

        if !self.state.history.is_resumption() {
            warn!(
                "Identity {} from {} is not the one that was lost; abandoning transfer",
                id, peer
            );
            return None;
        }

        match self.state.udp.try_clone() {
            Ok(socket) => {
                info!("Transfer resumes with {} at {}", id, peer);
                Some(Box::new(UdpChannel::new(socket, peer)))
            }
            Err(e) => {
                warn!("Cannot share the UDP socket: {}", e);
                None
            }
        }
    }
}

/// Wait for a four-byte identity datagram; anything else still queued is skipped
fn receive_identity(
    udp: &UdpSocket,
    timeout: Duration,
) -> io::Result<Option<(ClientId, SocketAddr)>> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 64];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        udp.set_read_timeout(Some(remaining))?;

        match udp.recv_from(&mut buf) {
            Ok((len, peer)) if len == ClientId::WIRE_SIZE => {
                let mut wire = [0u8; ClientId::WIRE_SIZE];
                wire.copy_from_slice(&buf[..len]);
                return Ok(Some((ClientId::from_wire(wire), peer)));
            }
            Ok((len, peer)) => {
                trace!(
                    "Skipping {} byte datagram from {} while waiting for an identity",
                    len,
                    peer
                );
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;
    use std::thread;
    use tether_config::ServerConfig;
    use tether_transfer::handshake;

    fn state() -> ServerState {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        ServerState::bind(&config).unwrap()
    }

    fn connect(state: &mut ServerState, id: i32) -> (TcpStream, ClientHandle) {
        let mut peer = TcpStream::connect(state.local_addr().unwrap()).unwrap();
        handshake(&mut peer, ClientId::new(id)).unwrap();
        let handle = state.accept_new_client().unwrap();
        (peer, handle)
    }

    #[test]
    fn test_tcp_same_identity_resumes() {
        let mut state = state();
        let (_lost, _) = connect(&mut state, 7);
        let addr = state.local_addr().unwrap();

        let mut peer = TcpStream::connect(addr).unwrap();
        handshake(&mut peer, ClientId::new(7)).unwrap();

        let mut reconnector = TcpReconnector::new(&mut state);
        let channel = reconnector.reconnect(Duration::from_secs(2));
        let resumed = reconnector.resumed();

        assert!(channel.is_some());
        let handle = resumed.unwrap();
        let client = state.registry().get(handle).unwrap();
        assert_eq!(client.identity(), ClientId::new(7));
        assert!(client.is_blocking());
        assert_eq!(state.registry().len(), 2);
    }

    #[test]
    fn test_tcp_other_identity_is_abandoned_but_kept() {
        let mut state = state();
        let (_lost, _) = connect(&mut state, 9);

        let mut peer = TcpStream::connect(state.local_addr().unwrap()).unwrap();
        handshake(&mut peer, ClientId::new(8)).unwrap();

        let mut reconnector = TcpReconnector::new(&mut state);
        assert!(reconnector.reconnect(Duration::from_secs(2)).is_none());
        assert!(reconnector.resumed().is_none());

        assert_eq!(state.registry().len(), 2);
        assert_eq!(
            state.history().entries(),
            vec![ClientId::new(9), ClientId::new(8)]
        );
    }

    #[test]
    fn test_tcp_timeout_restores_listener() {
        let mut state = state();
        let (_lost, _) = connect(&mut state, 7);

        let started = Instant::now();
        let mut reconnector = TcpReconnector::new(&mut state);
        assert!(reconnector.reconnect(Duration::from_millis(100)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));

        // A blocking listener waits for the late client instead of failing with WouldBlock
        let addr = state.local_addr().unwrap();
        let late = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let mut peer = TcpStream::connect(addr).unwrap();
            handshake(&mut peer, ClientId::new(5)).unwrap();
            peer
        });
        assert!(state.accept_new_client().is_some());
        late.join().unwrap();
    }

    #[test]
    fn test_udp_same_identity_resumes() {
        let mut state = state();
        let (_tcp, _) = connect(&mut state, 11);
        let server = state.udp_local_addr().unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(b"stale frame bytes", server).unwrap();
        peer.send_to(&ClientId::new(11).to_wire(), server).unwrap();

        let mut reconnector = UdpReconnector::new(&mut state);
        assert!(reconnector.reconnect(Duration::from_secs(2)).is_some());

        let mut echo = [0u8; 8];
        let (len, _) = peer.recv_from(&mut echo).unwrap();
        assert_eq!(&echo[..len], &ClientId::new(11).to_wire());
    }

    #[test]
    fn test_udp_other_identity_is_abandoned() {
        let mut state = state();
        let (_tcp, _) = connect(&mut state, 11);
        let server = state.udp_local_addr().unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(&ClientId::new(12).to_wire(), server).unwrap();

        let mut reconnector = UdpReconnector::new(&mut state);
        assert!(reconnector.reconnect(Duration::from_secs(2)).is_none());
        assert_eq!(
            state.history().entries(),
            vec![ClientId::new(11), ClientId::new(12)]
        );
    }

    #[test]
    fn test_udp_timeout_leaves_history_alone() {
        let mut state = state();
        let (_tcp, _) = connect(&mut state, 11);

        let mut reconnector = UdpReconnector::new(&mut state);
        assert!(reconnector.reconnect(Duration::from_millis(50)).is_none());
        assert_eq!(state.history().entries(), vec![ClientId::new(11)]);
    }
}
