// src/error.rs

//! Crate-wide error type
//!
//! Every catalog operation fails with one of these variants. The HTTP
//! adapter maps them onto status codes; nothing here is fatal to the
//! process.

use crate::packages::DecodeError;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Caller-supplied identifier is missing or malformed
    #[error("id invalid")]
    InvalidIdentifier,

    /// Upload extension is not one of the supported container formats
    #[error("do not support {0} file")]
    UnsupportedFormat(String),

    /// Container parsing failed on a mandatory field
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("{0} not found")]
    NotFound(String),

    /// Deletion is disabled on this server
    #[error("no permission to delete")]
    PermissionDenied,

    /// Opaque failure from the storage backend
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed request: wrong method, bad JSON, missing form field
    #[error("{0}")]
    Transport(String),

    /// Fewer manifest bytes were written than the document declares
    #[error("write body len not match: wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// The request was abandoned before the operation committed
    #[error("operation cancelled")]
    Cancelled,
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
