//! splitline: split-aware line reading for block-compressed files
//!
//! # Overview
//!
//! Large compressed text files are usually processed in parallel by cutting
//! them into byte-range splits. Split boundaries do not respect line
//! boundaries, so a naive reader duplicates or truncates the line straddling
//! each boundary. [`SplitLineReader`] reads one split and, combined with the
//! readers of the other splits, yields every line of the file exactly once.
//!
//! ## Key Features
//!
//! - **Exact partitioning**: contiguous splits over a file emit each line once
//! - **Codec selection by extension**: BGZF (`.bgz`, `.gz`) and plain text,
//!   with room for custom [`Codec`]s
//! - **Bounded lines**: over-long lines are truncated to a configured length
//! - **Constant memory**: one decoded BGZF block (or one 64 KiB chunk of a
//!   plain gzip stream) and one line at a time
//!
//! ## Quick Start
//!
//! ```no_run
//! use splitline::{CodecRegistry, FileSplit, ReaderConfig, SplitLineReader};
//!
//! # fn main() -> splitline::Result<()> {
//! let codecs = CodecRegistry::default();
//! let config = ReaderConfig::default().with_max_line_length(1 << 20);
//!
//! // Second of several splits; the start must be a BGZF block offset
//! let split = FileSplit::new("access.log.bgz", 1_048_576, 1_048_576);
//! let mut reader = SplitLineReader::open(split, &codecs, &config)?;
//!
//! let mut line = Vec::new();
//! while reader.next_line(&mut line)? {
//!     // Process one line at a time
//! }
//! reader.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`reader`]: the split reader and the host record contract
//! - [`io`]: byte sources, codecs (BGZF, plain) and the line tokenizer
//! - [`config`]: reader configuration
//! - [`error`]: error type

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod io;
pub mod reader;
pub mod types;

// Re-export commonly used types
pub use config::ReaderConfig;
pub use error::{Result, SplitLineError};
pub use io::{Codec, CodecRegistry, DataSource};
pub use reader::{Lines, RecordReader, SplitLineReader};
pub use types::{FileSplit, ReaderState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
