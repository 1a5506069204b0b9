//! TCP plumbing: the listener, the identity handshake and the length-prefixed channel

use crate::frame::MAX_FRAME_LEN;
use bytes::{BufMut, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use tether_types::{Channel, ClientId, Error, Result};
use tracing::debug;

/// Bind a listening socket with address reuse and the given backlog
pub fn bind_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    debug!("Listening on {} (backlog {})", addr, backlog);
    Ok(socket.into())
}

/// Read the identity a freshly accepted client declares
pub fn read_identity(stream: &mut TcpStream) -> io::Result<ClientId> {
    let mut wire = [0u8; ClientId::WIRE_SIZE];
    stream.read_exact(&mut wire)?;
    Ok(ClientId::from_wire(wire))
}

/// Declare `id` on a freshly connected stream
pub fn handshake(stream: &mut TcpStream, id: ClientId) -> io::Result<()> {
    stream.write_all(&id.to_wire())
}

/// Frame channel over a TCP stream; each frame carries a big-endian `u32` length prefix
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
    peer: Option<SocketAddr>,
}

impl TcpChannel {
    /// Wrap a connected stream
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        // Stop-and-wait traffic stalls behind Nagle's algorithm otherwise
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        Ok(Self { stream, peer })
    }
}

impl Channel for TcpChannel {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let len = u32::try_from(frame.len())
            .ok()
            .filter(|len| *len as usize <= MAX_FRAME_LEN)
            .ok_or_else(|| Error::protocol(format!("frame of {} bytes too large", frame.len())))?;

        let mut buf = BytesMut::with_capacity(4 + frame.len());
        buf.put_u32(len);
        buf.put_slice(frame);

        self.stream
            .write_all(&buf)
            .map_err(|e| Error::from_link(&e))
    }

    fn recv_frame(&mut self) -> Result<Vec<u8>> {
        let mut prefix = [0u8; 4];
        self.stream
            .read_exact(&mut prefix)
            .map_err(|e| Error::from_link(&e))?;

        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(Error::protocol(format!("frame length {} exceeds limit", len)));
        }

        let mut frame = vec![0u8; len];
        self.stream
            .read_exact(&mut frame)
            .map_err(|e| Error::from_link(&e))?;
        Ok(frame)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream
            .set_read_timeout(timeout)
            .map_err(|e| Error::from_link(&e))
    }

    fn describe(&self) -> String {
        match self.peer {
            Some(addr) => format!("tcp://{}", addr),
            None => "tcp://<unknown>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use std::thread;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 1).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_identity_handshake() {
        let (mut client, mut server) = pair();

        handshake(&mut client, ClientId::new(7)).unwrap();
        assert_eq!(read_identity(&mut server).unwrap(), ClientId::new(7));
    }

    #[test]
    fn test_frames_keep_their_boundaries() {
        let (client, server) = pair();
        let mut sender = TcpChannel::new(client).unwrap();
        let mut receiver = TcpChannel::new(server).unwrap();

        let first = Frame::Meta { size: 3 }.encode();
        let second = Frame::Data {
            offset: 0,
            payload: b"abc".to_vec(),
        }
        .encode();

        let writer = thread::spawn(move || {
            sender.send_frame(&first).unwrap();
            sender.send_frame(&second).unwrap();
        });

        assert_eq!(
            Frame::decode(&receiver.recv_frame().unwrap()).unwrap(),
            Frame::Meta { size: 3 }
        );
        assert!(matches!(
            Frame::decode(&receiver.recv_frame().unwrap()).unwrap(),
            Frame::Data { offset: 0, .. }
        ));
        writer.join().unwrap();
    }

    #[test]
    fn test_read_timeout_maps_to_timeout() {
        let (_client, server) = pair();
        let mut receiver = TcpChannel::new(server).unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();

        let err = receiver.recv_frame().unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[test]
    fn test_peer_close_is_a_link_error() {
        let (client, server) = pair();
        drop(client);
        let mut receiver = TcpChannel::new(server).unwrap();

        let err = receiver.recv_frame().unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_oversized_length_prefix() {
        let (mut client, server) = pair();
        client.write_all(&u32::MAX.to_be_bytes()).unwrap();
        let mut receiver = TcpChannel::new(server).unwrap();

        assert!(matches!(
            receiver.recv_frame().unwrap_err(),
            Error::Protocol { .. }
        ));
    }
}
