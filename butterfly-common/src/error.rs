//! Error types for the butterfly-osm tile converter
//!
//! Library crates return [`Result`] so that a fatal condition aborts the
//! conversion at the first `?`. Problems with a single entity are never
//! reported through this type; they are counted and logged by the caller.

use std::path::Path;
use thiserror::Error;

/// Main error type for butterfly-osm operations
#[derive(Debug, Error)]
pub enum Error {
    /// Structurally invalid input: oversized or corrupt blocks, unparseable
    /// payloads, inconsistent arrays, cyclic relations
    #[error("Data error: {0}")]
    DataError(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal consistency fault in the geometry pipeline
    #[error("Logic error: {0}")]
    LogicError(String),

    /// Invalid configuration or parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Wrap an I/O failure with the path it happened on.
    pub fn io_at(path: &Path, err: std::io::Error) -> Self {
        Error::IoError(std::io::Error::new(
            err.kind(),
            format!("{}: {err}", path.display()),
        ))
    }

    /// Whether this error comes from malformed input rather than the environment.
    pub fn is_data_error(&self) -> bool {
        matches!(self, Error::DataError(_))
    }
}

/// Convenience result type for butterfly-osm operations
pub type Result<T> = std::result::Result<T, Error>;
