//! Core type system and error handling for Tether
//!
//! This crate provides the foundational types shared by the Tether workspace:
//!
//! - **Error handling**: one error enum separating link failures from local failures
//! - **Core types**: client identities and transfer statistics
//! - **Traits**: the `Channel`, `Reconnect` and `TransferEngine` seams between the server
//!   core and the transfer engine
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use tether_types::{ClientId, TransferStats};
//!
//! let id = ClientId::new(42);
//! assert_eq!(ClientId::from_wire(id.to_wire()), id);
//!
//! let stats = TransferStats::new(1024);
//! assert!(!stats.was_resumed());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
pub use result::Result;
pub use traits::{Channel, NoReconnect, Reconnect, TransferEngine};
pub use types::{ClientId, TransferStats};
