//! Error and Result types for rbkv operations.

use crate::storage::Address;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for rbkv operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for storage, tree and database operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Lookup or delete of a key that is not in the tree.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A key or value outside of {integer, float, string}.
    #[error("Invalid {role} type: {reason}")]
    InvalidType {
        /// Either `"key"` or `"value"`.
        role: &'static str,
        /// Why the conversion was rejected.
        reason: String,
    },

    /// Rotation at a node that has no child to rotate up.
    #[error("Cannot rotate {direction} at key {key}: no pivot child")]
    InvalidRotation {
        /// Key of the node being rotated.
        key: String,
        /// `"left"` or `"right"`.
        direction: &'static str,
    },

    /// Operation on a database handle after `close()`.
    #[error("Database closed")]
    Closed,

    /// Read of an address that lies inside the superblock.
    #[error("Invalid record address: {0}")]
    InvalidAddress(Address),

    /// A stored record could not be decoded.
    #[error("Corrupted record at address {address}: {reason}")]
    Corrupted {
        /// Address of the offending record.
        address: Address,
        /// What went wrong while decoding.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl Error {
    /// Returns true for [`Error::KeyNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }

    pub(crate) fn corrupted(address: Address, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            address,
            reason: reason.into(),
        }
    }
}
