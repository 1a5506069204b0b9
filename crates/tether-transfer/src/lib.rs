//! Socket primitives and the resumable transfer engine for Tether
//!
//! This crate owns everything that touches the wire below the command protocol:
//!
//! - **Frames**: the tagged binary messages the engine exchanges ([`frame`])
//! - **Channels**: length-prefixed TCP framing and datagram-per-frame UDP ([`tcp`], [`udp`])
//! - **Readiness**: one-shot readiness waits over raw descriptors ([`readiness`])
//! - **Engine**: the chunked stop-and-wait engine that resumes after a reconnection ([`engine`])
//! - **Client helpers**: the identity handshake and redialers a client uses to come back
//!   after a broken link ([`client`])

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod engine;
pub mod frame;
pub mod readiness;
pub mod tcp;
pub mod udp;

pub use client::{connect, rendezvous, TcpRedialer, UdpRedialer};
pub use engine::{ChunkedEngine, EngineOptions};
pub use frame::Frame;
pub use readiness::{wait_readable, ReadinessSet};
pub use tcp::{bind_listener, handshake, read_identity, TcpChannel};
pub use udp::{bind_udp, UdpChannel, RENDEZVOUS_SIGNAL};

/// Byte the receiving side of a download sends once it holds the whole file
pub const ACK_TOKEN: u8 = 0x06;
