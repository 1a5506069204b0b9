//! Shared helpers for the server integration tests
//!
//! Each test gets its own server thread bound to ephemeral loopback ports and serving files
//! out of a temporary directory.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use tether_config::Config;
use tether_server::Server;
use tether_transfer::{connect, ChunkedEngine, EngineOptions, TcpChannel, UdpChannel};
use tether_types::{Channel, ClientId, Error, Result};

/// A running server and the directory it serves
pub struct TestServer {
    pub tcp: SocketAddr,
    pub udp: SocketAddr,
    pub root: TempDir,
}

impl TestServer {
    /// Start a server with test-friendly timeouts, adjusted by `tweak`
    pub fn start(tweak: impl FnOnce(&mut Config)) -> Self {
        let root = TempDir::new().unwrap();

        let mut config = Config::default();
        config.server.port = 0;
        config.server.file_root = root.path().to_path_buf();
        config.transfer.chunk_size = 512;
        config.transfer.io_timeout_ms = 200;
        config.transfer.max_retries = 3;
        config.transfer.reconnect_timeout_secs = 2;
        tweak(&mut config);

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut server = Server::bind(&config).unwrap();
            tx.send((
                server.local_addr().unwrap(),
                server.udp_local_addr().unwrap(),
            ))
            .unwrap();
            server.run();
        });

        let (tcp, udp) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        Self { tcp, udp, root }
    }

    /// Start a server with the default test settings
    pub fn start_default() -> Self {
        Self::start(|_| {})
    }

    /// Connect and declare `id`
    pub fn connect(&self, id: i32) -> TcpStream {
        let stream = connect(self.tcp, ClientId::new(id)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        stream
    }

    /// Put a file into the served directory
    pub fn put_file(&self, name: &str, content: &[u8]) {
        std::fs::write(self.root.path().join(name), content).unwrap();
    }

    /// Read a file from the served directory
    pub fn file(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.root.path().join(name)).unwrap()
    }
}

/// Engine options matching the server's test settings
pub fn client_engine() -> ChunkedEngine {
    ChunkedEngine::new(EngineOptions {
        chunk_size: 512,
        io_timeout: Duration::from_millis(200),
        max_retries: 3,
        reconnect_timeout: Duration::from_secs(2),
    })
}

/// Deterministic file content
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Send a command line
pub fn send_line(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).unwrap();
}

/// Read exactly `len` bytes
pub fn read_exact(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).unwrap();
    buf
}

/// Read until the received bytes end with `suffix`; returns everything read
pub fn read_until_suffix(stream: &mut TcpStream, suffix: &[u8]) -> Vec<u8> {
    let mut received = Vec::new();
    let mut byte = [0u8; 1];
    while !received.ends_with(suffix) {
        match stream.read(&mut byte) {
            Ok(0) => panic!(
                "connection closed before {:?}; got {:?}",
                String::from_utf8_lossy(suffix),
                String::from_utf8_lossy(&received)
            ),
            Ok(_) => received.push(byte[0]),
            Err(e) => panic!("read failed: {}", e),
        }
    }
    received
}

/// Whether the server closed the connection
pub fn is_closed(stream: &mut TcpStream) -> bool {
    let mut byte = [0u8; 1];
    matches!(stream.read(&mut byte), Ok(0))
}

/// Wait until the file exists with the expected length
pub fn wait_for_file(path: &Path, len: u64) -> bool {
    for _ in 0..100 {
        if std::fs::metadata(path).is_ok_and(|meta| meta.len() == len) {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

/// A channel that loses its link after delivering a number of frames
pub struct FaultyChannel {
    inner: Box<dyn Channel>,
    frames_left: usize,
    stream: Option<TcpStream>,
}

impl FaultyChannel {
    /// TCP link; the connection is cut when the frames run out
    pub fn tcp(stream: TcpStream, frames: usize) -> Self {
        let cut = stream.try_clone().unwrap();
        Self {
            inner: Box::new(TcpChannel::new(stream).unwrap()),
            frames_left: frames,
            stream: Some(cut),
        }
    }

    /// UDP link; the datagrams that follow the last delivered frame go unread
    pub fn udp(channel: UdpChannel, frames: usize) -> Self {
        Self {
            inner: Box::new(channel),
            frames_left: frames,
            stream: None,
        }
    }
}

impl Channel for FaultyChannel {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.inner.send_frame(frame)
    }

    fn recv_frame(&mut self) -> Result<Vec<u8>> {
        if self.frames_left == 0 {
            if let Some(stream) = &self.stream {
                cut(stream);
            }
            return Err(Error::network("simulated link failure"));
        }
        self.frames_left -= 1;
        self.inner.recv_frame()
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout)
    }

    fn describe(&self) -> String {
        format!("faulty {}", self.inner.describe())
    }
}

/// Cut a connection the way a network failure would
pub fn cut(stream: &TcpStream) {
    let _ = stream.shutdown(Shutdown::Both);
}
