//! Command handlers
//!
//! Every handler runs on behalf of one client, passed explicitly as the session's active
//! handle. A TCP transfer that resumes on a new connection moves the active handle to that
//! connection, so the acknowledgement and the final reply travel over the link that is
//! actually alive.

mod text;
mod transfer;
mod udp;

use crate::client::{Client, ClientHandle};
use crate::commands::Command;
use crate::state::{ServerState, Settings};
use tether_transfer::ACK_TOKEN;
use tether_types::TransferEngine;
use tracing::{debug, warn};

/// Context a handler runs in
pub struct Session<'a> {
    pub(crate) state: &'a mut ServerState,
    pub(crate) engine: &'a dyn TransferEngine,
    pub(crate) settings: &'a Settings,
    active: ClientHandle,
}

impl<'a> Session<'a> {
    /// Start a session for the client behind `active`
    pub fn new(
        state: &'a mut ServerState,
        engine: &'a dyn TransferEngine,
        settings: &'a Settings,
        active: ClientHandle,
    ) -> Self {
        Self {
            state,
            engine,
            settings,
            active,
        }
    }

    /// The client the session currently talks to
    pub fn active(&self) -> ClientHandle {
        self.active
    }

    pub(crate) fn set_active(&mut self, handle: ClientHandle) {
        debug!("Session moves from client {} to {}", self.active, handle);
        self.active = handle;
    }

    pub(crate) fn client(&mut self) -> Option<&mut Client> {
        self.state.registry.get_mut(self.active)
    }

    /// Send bytes to the active client; failures are logged and otherwise ignored
    pub fn reply(&mut self, bytes: &[u8]) {
        let handle = self.active;
        match self.client() {
            Some(client) => {
                if let Err(e) = client.send(bytes) {
                    warn!("Reply to client {} failed: {}", handle, e);
                }
            }
            None => warn!("Client {} vanished before its reply", handle),
        }
    }

    /// Wait for the acknowledgement token the client sends after a download
    pub(crate) fn read_ack(&mut self) -> bool {
        let handle = self.active;
        let timeout = self.settings.client_timeout;
        let Some(client) = self.client() else {
            return false;
        };

        let token = client
            .set_read_timeout(timeout)
            .and_then(|()| client.read_byte());
        let _ = client.set_read_timeout(None);

        match token {
            Ok(ACK_TOKEN) => true,
            Ok(other) => {
                warn!("Client {} acknowledged with {:#04x}", handle, other);
                false
            }
            Err(e) => {
                warn!("No acknowledgement from client {}: {}", handle, e);
                false
            }
        }
    }
}

/// Run the handler bound to `command`
pub(crate) fn run(command: Command, session: &mut Session<'_>, argument: &[u8]) {
    match command {
        Command::Echo => text::echo(session, argument),
        Command::Time => text::time(session, argument),
        Command::Quit => text::quit(session, argument),
        Command::Download => transfer::download(session, argument),
        Command::Upload => transfer::upload(session, argument),
        Command::DownloadUdp => udp::download(session, argument),
        Command::UploadUdp => udp::upload(session, argument),
    }
}
