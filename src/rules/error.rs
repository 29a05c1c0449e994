//! Whitelist loading error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading the whitelist.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the whitelist file.
    #[error("Failed to read whitelist file {path}: {source}")]
    ReadError {
        /// Path to the file that couldn't be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A reload was requested but the store has no file to read from.
    #[error("No whitelist source configured")]
    NoSource,

    /// A rule pattern is not a valid glob.
    #[error("Invalid rule pattern {pattern}: {message}")]
    InvalidPattern {
        /// The pattern as written in the whitelist.
        pattern: String,
        /// Description of why the pattern was rejected.
        message: String,
    },
}
