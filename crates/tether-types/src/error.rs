//! Error types and handling for Tether
//!
//! Every fallible operation in the workspace reports a [`Error`]. The variants separate
//! failures of the link to the peer (which a transfer may survive by reconnecting) from
//! local failures (a missing file, a refused permission) that no reconnection can fix.

use std::path::PathBuf;

/// Main error type for Tether operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Local I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// File not found
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found
        path: PathBuf,
    },

    /// Permission denied
    #[error("Permission denied: {path}")]
    PermissionDenied {
        /// Path to the file with permission issues
        path: PathBuf,
    },

    /// The connection to the peer failed
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// The peer sent something the protocol does not allow
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message describing the violation
        message: String,
    },

    /// The peer stopped answering within the read timeout
    #[error("Operation timed out")]
    Timeout,

    /// The peer abandoned the transfer
    #[error("Transfer aborted by peer: {reason}")]
    Aborted {
        /// Reason given by the peer
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local I/O errors
    Io,
    /// Link errors
    Network,
    /// Protocol violations
    Protocol,
    /// Timeout
    Timeout,
    /// Peer abort
    Aborted,
    /// Configuration errors
    Config,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::FileNotFound { .. } | Self::PermissionDenied { .. } => {
                ErrorKind::Io
            }
            Self::Network { .. } => ErrorKind::Network,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Timeout => ErrorKind::Timeout,
            Self::Aborted { .. } => ErrorKind::Aborted,
            Self::Config { .. } => ErrorKind::Config,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Check whether re-establishing the link could let the operation continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout | Self::Protocol { .. }
        )
    }

    /// Wrap an I/O error raised while talking to the peer
    pub fn from_link(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Network {
                message: error.to_string(),
            },
        }
    }

    /// Wrap an I/O error raised while touching a local file
    pub fn from_file(error: std::io::Error, path: impl Into<PathBuf>) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound { path: path.into() },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path: path.into() },
            _ => Self::Io {
                message: format!("{}: {}", path.into().display(), error),
            },
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
