//! The event loop

use crate::client::{is_hang_up, ClientHandle};
use crate::dispatch::{requests_close, Dispatcher};
use crate::handlers::Session;
use crate::state::{ServerState, Settings};
use std::io;
use std::net::SocketAddr;
use tether_config::Config;
use tether_transfer::{ChunkedEngine, EngineOptions, ReadinessSet};
use tether_types::{Error, Result, TransferEngine};
use tracing::{debug, info, warn};

/// Single-threaded server: one readiness wait per turn, one line per ready client
pub struct Server {
    state: ServerState,
    dispatcher: Dispatcher,
    engine: Box<dyn TransferEngine>,
    settings: Settings,
    readiness: ReadinessSet,
}

impl Server {
    /// Bind the sockets described by `config`, using the chunked transfer engine
    pub fn bind(config: &Config) -> Result<Self> {
        let engine = ChunkedEngine::new(EngineOptions::from(&config.transfer));
        Self::with_engine(config, Box::new(engine))
    }

    /// Bind the sockets described by `config`, using `engine` for file transfers
    pub fn with_engine(config: &Config, engine: Box<dyn TransferEngine>) -> Result<Self> {
        let settings = Settings::from_config(config);
        let state = ServerState::bind(&config.server)?;
        Self::from_parts(state, settings, engine)
    }

    /// Assemble a server around existing state
    pub fn from_parts(
        state: ServerState,
        settings: Settings,
        engine: Box<dyn TransferEngine>,
    ) -> Result<Self> {
        let readiness = ReadinessSet::new()
            .map_err(|e| Error::other(format!("Failed to create poller: {}", e)))?;

        Ok(Self {
            state,
            dispatcher: Dispatcher::new()?,
            engine,
            settings,
            readiness,
        })
    }

    /// Server state
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Address of the TCP listener
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.state.local_addr()
    }

    /// Address of the shared UDP socket
    pub fn udp_local_addr(&self) -> io::Result<SocketAddr> {
        self.state.udp_local_addr()
    }

    /// Serve forever
    pub fn run(&mut self) -> ! {
        match (self.local_addr(), self.udp_local_addr()) {
            (Ok(tcp), Ok(udp)) => info!("Serving on tcp://{} and udp://{}", tcp, udp),
            _ => info!("Serving"),
        }

        loop {
            self.turn();
        }
    }

    /// Run one turn: wait for readiness, accept at most one client, then read one line
    /// from every ready client.
    pub fn turn(&mut self) {
        let listener_fd = self.state.listener_fd();
        let parked: Vec<(ClientHandle, u64)> = self
            .state
            .registry
            .pollable()
            .map(|client| (client.handle(), client.serial()))
            .collect();

        let mut fds = Vec::with_capacity(parked.len() + 1);
        fds.push(listener_fd);
        fds.extend(parked.iter().map(|(handle, _)| handle.raw()));

        let ready = match self.readiness.wait(&fds, None) {
            Ok(ready) => ready,
            Err(e) => {
                debug!("Readiness wait failed: {}", e);
                return;
            }
        };

        if ready.contains(&listener_fd) {
            self.state.accept_new_client();
        }

        for (handle, serial) in parked {
            // A reconnection earlier in this turn may have closed a descriptor and handed
            // its number to a newcomer
            if ready.contains(&handle.raw()) && self.is_still_parked(handle, serial) {
                self.process_client(handle);
            }
        }
    }

    fn is_still_parked(&self, handle: ClientHandle, serial: u64) -> bool {
        self.state
            .registry
            .get(handle)
            .is_some_and(|client| client.serial() == serial && !client.is_hung_up())
    }

    /// Read and execute one command line from a ready client
    fn process_client(&mut self, handle: ClientHandle) {
        let max_line_length = self.settings.max_line_length;
        let Some(client) = self.state.registry.get_mut(handle) else {
            return;
        };

        if let Err(e) = client.set_blocking(true) {
            warn!("Cannot switch client {} to blocking mode: {}", handle, e);
            return;
        }

        let line = match client.read_line(max_line_length) {
            Ok(Some(line)) => line,
            Ok(None) => {
                client.mark_hung_up();
                info!("Client {} at {} hung up", handle, client.peer());
                return;
            }
            Err(e) if is_hang_up(&e) => {
                client.mark_hung_up();
                info!("Client {} at {} dropped the connection: {}", handle, client.peer(), e);
                return;
            }
            Err(e) => {
                warn!("Reading from client {} failed: {}", handle, e);
                self.park(handle);
                return;
            }
        };

        let mut session = Session::new(
            &mut self.state,
            self.engine.as_ref(),
            &self.settings,
            handle,
        );
        let outcome = self.dispatcher.dispatch(&mut session, &line);
        let active = session.active();
        debug!("Client {}: {:?}", handle, outcome);

        if requests_close(&line) && self.state.registry.remove(handle).is_some() {
            info!("Client {} removed", handle);
        }

        self.park(handle);
        if active != handle {
            self.park(active);
        }
    }

    /// Return a client to non-blocking mode until its next readiness
    fn park(&mut self, handle: ClientHandle) {
        if let Some(client) = self.state.registry.get_mut(handle) {
            if !client.is_hung_up() {
                if let Err(e) = client.set_blocking(false) {
                    warn!("Cannot park client {}: {}", handle, e);
                }
            }
        }
    }
}
