//! Server-wide state: the sockets, the client registry and the identity history

use crate::client::{Client, ClientHandle};
use crate::identity::IdentityHistory;
use crate::registry::ClientRegistry;
use std::io;
use std::ffi::OsStr;
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_config::{Config, ServerConfig};
use tether_transfer::{bind_listener, bind_udp, read_identity};
use tether_types::{ClientId, Error, Result};
use tracing::{debug, info, warn};

/// Settings the command handlers consult
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Longest command line read in one go
    pub max_line_length: usize,
    /// Directory relative transfer paths resolve against
    pub file_root: PathBuf,
    /// Bound on the UDP rendezvous and the download acknowledgement; `None` waits for
    /// the client indefinitely
    pub client_timeout: Option<Duration>,
}

impl Settings {
    /// Derive handler settings from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_line_length: config.server.max_line_length,
            file_root: config.server.file_root.clone(),
            client_timeout: config.server.client_timeout(),
        }
    }

    /// Resolve a transfer argument to a path; relative paths land under the file root.
    ///
    /// Surrounding whitespace and the line terminator are dropped; the name itself is used
    /// byte for byte.
    pub fn resolve(&self, argument: &[u8]) -> PathBuf {
        let path = Path::new(OsStr::from_bytes(trim_ascii(argument)));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.file_root.join(path)
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(start, |last| last + 1);
    &bytes[start..end]
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything the server owns for its whole lifetime
#[derive(Debug)]
pub struct ServerState {
    pub(crate) listener: TcpListener,
    pub(crate) udp: UdpSocket,
    pub(crate) registry: ClientRegistry,
    pub(crate) history: IdentityHistory,
    handshake_timeout: Option<Duration>,
    next_serial: u64,
}

impl ServerState {
    /// Bind the listener and the shared UDP socket described by `config`.
    ///
    /// New clients get `config.client_timeout_ms` to send their identity, or forever if unset.
    pub fn bind(config: &ServerConfig) -> Result<Self> {
        let tcp_addr = config.tcp_addr()?;
        let udp_addr = config.udp_addr()?;

        let listener = bind_listener(tcp_addr, config.backlog)
            .map_err(|e| Error::network(format!("Failed to listen on {}: {}", tcp_addr, e)))?;
        let udp = bind_udp(udp_addr)
            .map_err(|e| Error::network(format!("Failed to bind UDP {}: {}", udp_addr, e)))?;

        Ok(Self {
            listener,
            udp,
            registry: ClientRegistry::new(),
            history: IdentityHistory::new(),
            handshake_timeout: config.client_timeout(),
            next_serial: 0,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Address the shared UDP socket is bound to
    pub fn udp_local_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// Connected clients
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Recently observed identities
    pub fn history(&self) -> &IdentityHistory {
        &self.history
    }

    pub(crate) fn listener_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    /// Record a freshly observed identity
    pub fn register_new_client_id(&mut self, id: ClientId) {
        self.history.push(id);
        debug!("Identity history now {:?}", self.history.entries());
    }

    /// Accept one pending connection and read the identity it declares.
    ///
    /// The client is registered in non-blocking mode. A connection whose identity cannot be
    /// read is dropped and leaves no trace.
    pub fn accept_new_client(&mut self) -> Option<ClientHandle> {
        let (mut stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                return None;
            }
        };

        let identity = stream
            .set_read_timeout(self.handshake_timeout)
            .and_then(|()| read_identity(&mut stream))
            .and_then(|id| stream.set_read_timeout(None).map(|()| id));
        let identity = match identity {
            Ok(id) => id,
            Err(e) => {
                warn!("Dropping connection from {}: no identity ({})", peer, e);
                return None;
            }
        };

        self.register_new_client_id(identity);

        self.next_serial += 1;
        let client = match Client::new(stream, identity, peer, self.next_serial) {
            Ok(client) => client,
            Err(e) => {
                warn!("Dropping connection from {}: {}", peer, e);
                return None;
            }
        };

        let handle = client.handle();
        self.registry.insert(client);
        info!("Accepted client {} from {} with identity {}", handle, peer, identity);
        Some(handle)
    }
}
