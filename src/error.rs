//! Crate error type
//!
//! Three kinds of failure reach callers of the memory database: a hash that
//! no tier can resolve, a failure of the persistent store, and misuse of
//! the reserved meta-root. The remaining variants come from the file store
//! and configuration layers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Not in the clean cache, the dirty table or the store. A normal
    /// outcome for lookups, see [`Error::is_not_found`].
    #[error("node not found: {0}")]
    NotFound(String),

    /// Store failure. Passed through unchanged and never retried here.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The zero hash was used as an ordinary node
    #[error("meta-root misuse: {0}")]
    MetaRoot(String),

    // Encoding
    #[error("node encoding failed: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    // File store
    #[error("corrupt store data: {0}")]
    Corruption(String),

    #[error("not a node store file: {0}")]
    InvalidFile(String),

    #[error("unsupported store version {found}, expected {expected}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
