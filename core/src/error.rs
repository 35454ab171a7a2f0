//! Error types for the storage client.
//!
//! # Design
//! Callers need to branch on failure *kind* without string inspection:
//! transport failures (network-level, caller may retry), authentication
//! failures, and remote status codes that do not match an operation's
//! documented success code all get distinct variants. The client itself
//! never retries and never swallows a remote failure.

use std::io;

/// Errors returned by the storage client.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The HTTP round-trip could not complete (DNS, connect, TLS, timeout).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The auth handshake was rejected with a status other than 403.
    #[error("authentication failed with status {code}")]
    Auth { code: u16 },

    /// The auth handshake returned 403 for this user.
    #[error("forbidden for user '{user}'")]
    Forbidden { user: String },

    /// The remote returned a status code other than the operation's
    /// documented success code.
    #[error("{operation} returned unexpected status {code}")]
    UnexpectedStatus { operation: &'static str, code: u16 },

    /// The response violated the protocol contract, e.g. a nominally
    /// successful auth response missing `x-storage-url`.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A local file could not be read for upload.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<ureq::Error> for StorageError {
    fn from(e: ureq::Error) -> Self {
        StorageError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
