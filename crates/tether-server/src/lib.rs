//! Resumable file-transfer server
//!
//! Clients connect over TCP, declare a four-byte identity and then issue line-based
//! commands. Files move over the client's TCP connection or over one UDP socket shared by
//! all clients. When a transfer's link breaks, the server waits for a connection that
//! declares the same identity again and continues the transfer where it stopped.
//!
//! Everything runs on one thread: the [`Server`] event loop waits for readiness on the
//! listener and all parked clients, accepts at most one newcomer per turn and handles one
//! command line from every ready client. A command, transfers included, runs to completion
//! before the loop moves on.
//!
//! # Examples
//!
//! ```rust,no_run
//! use tether_config::Config;
//! use tether_server::Server;
//!
//! let mut server = Server::bind(&Config::default()).expect("bind");
//! server.run();
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod commands;
pub mod dispatch;
pub mod handlers;
pub mod identity;
pub mod multiplexer;
pub mod reconnect;
pub mod registry;
pub mod state;

pub use client::{Client, ClientHandle};
pub use commands::{Command, CommandTable};
pub use dispatch::{requests_close, DispatchOutcome, Dispatcher};
pub use handlers::Session;
pub use identity::IdentityHistory;
pub use multiplexer::Server;
pub use reconnect::{TcpReconnector, UdpReconnector};
pub use registry::ClientRegistry;
pub use state::{ServerState, Settings};
