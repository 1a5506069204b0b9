//! Result type alias for Tether operations

use crate::Error;

/// Result type alias for Tether operations
pub type Result<T> = std::result::Result<T, Error>;
