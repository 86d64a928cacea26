//! Error types for splitline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for splitline operations
pub type Result<T> = std::result::Result<T, SplitLineError>;

/// Error types that can occur while reading a split
///
/// None of these are retried inside the crate. A reader that returns an error
/// from `next` should be closed and the split rescheduled by whoever owns it.
#[derive(Debug, Error)]
pub enum SplitLineError {
    /// I/O error (seek, read, or corrupt compressed data)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No codec is registered for the file's naming convention
    #[error("Codec for file {} not found, cannot run", path.display())]
    UnsupportedFormat {
        /// Path whose extension matched no codec
        path: PathBuf,
    },

    /// A configuration value could not be interpreted
    #[error("Invalid configuration value for {key}: {value:?} ({msg})")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Raw value as supplied
        value: String,
        /// Parse failure description
        msg: String,
    },

    /// Malformed compressed container
    #[error("Compression error: {0}")]
    Compression(String),

    /// Invalid split range
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// The reader was used after `close()`
    #[error("Reader has been closed")]
    ReaderClosed,
}
