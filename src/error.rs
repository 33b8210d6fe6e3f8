//! Error type shared by every control operation.
//!
//! Every public operation in the crate returns [`Result`]. Failures are
//! surfaced immediately to the caller; nothing in the control core retries or
//! downgrades an error to a default value.

use thiserror::Error;

use crate::backend::BackendKind;
use crate::device::{TileLoc, TileType};

/// Control-core error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Null/out-of-range input or a malformed device configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Location resolves to no known tile, or to the wrong tile type.
    #[error("invalid tile {loc} ({tile_type}): {reason}")]
    InvalidTile {
        loc: TileLoc,
        tile_type: TileType,
        reason: &'static str,
    },

    /// Valid operation that this generation's descriptor table does not carry.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(&'static str),

    /// A value does not fit its target bit-field.
    #[error("value 0x{value:X} exceeds field precision (lsb {lsb}, mask 0x{mask:08X})")]
    PrecisionExceeded { value: u32, lsb: u8, mask: u32 },

    /// A bounded poll did not observe the expected value in time.
    #[error(
        "timed out after {timeout_us} us polling 0x{addr:016X} for (value & 0x{mask:08X}) == 0x{expected:08X}"
    )]
    Timeout {
        addr: u64,
        mask: u32,
        expected: u32,
        timeout_us: u32,
    },

    /// The execution sink failed a read or write.
    #[error("backend error: {0}")]
    Backend(String),

    /// Binding to a backend kind that is not present in the registry.
    #[error("backend '{0}' is not available in this build")]
    InvalidBackend(BackendKind),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Whether the caller may reasonably retry the same call.
    ///
    /// Only timeouts qualify; backend errors are backend-specific and
    /// everything else is a caller or configuration bug.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Whether this is a poll timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Backend(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
