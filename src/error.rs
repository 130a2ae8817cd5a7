//! Error types for usergate

use std::fmt::Display;

use thiserror::Error;

/// The main error type for store, hashing and session operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("storage: {0}")]
    Storage(#[from] heed::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("password hash: {0}")]
    Hash(String),

    #[error("entropy source: {0}")]
    Entropy(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("corrupted record: {0}")]
    Corrupted(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for usergate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Convert a hashing library error (argon2 / password-hash) into `Error::Hash`
pub(crate) fn hash_err<E: Display>(e: E) -> Error {
    Error::Hash(e.to_string())
}

/// Convert an OS randomness failure into `Error::Entropy`
pub(crate) fn entropy_err<E: Display>(e: E) -> Error {
    Error::Entropy(e.to_string())
}
