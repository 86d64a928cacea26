//! Split-aware line reader
//!
//! A large file is cut into byte-range splits that are read independently,
//! often by different workers. Split boundaries ignore line boundaries, so
//! each reader follows one convention to make every line come out exactly
//! once across all splits:
//!
//! - A reader whose split starts past 0 discards the first line it sees.
//!   That line (or its tail) belongs to the previous split.
//! - A reader keeps returning lines while its position is at or before the
//!   split end. The check happens *before* each read, so the line that
//!   crosses the end is returned here, and it is exactly the line the next
//!   split discards.
//!
//! Positions are compressed-file offsets reported by the
//! [`DecodingFilter`], not counts of decoded bytes. After the discard the
//! reader re-reads the position instead of trusting the split start, since a
//! codec can consume a variable amount of input per line.
//!
//! # Usage
//!
//! One reader per split, owned by one thread. Nothing here is shared or
//! locked; cancel by dropping or closing the reader.
//!
//! ```no_run
//! use splitline::{CodecRegistry, FileSplit, ReaderConfig, SplitLineReader};
//!
//! # fn main() -> splitline::Result<()> {
//! let codecs = CodecRegistry::default();
//! let config = ReaderConfig::default();
//! let split = FileSplit::new("events.log.bgz", 0, 64 * 1024 * 1024);
//!
//! for line in SplitLineReader::open(split, &codecs, &config)?.into_lines() {
//!     let line = line?;
//!     // one record at a time
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::ReaderConfig;
use crate::error::{Result, SplitLineError};
use crate::io::codec::{CodecRegistry, DecodingFilter};
use crate::io::line::{LineReader, LineTokenizer};
use crate::io::source::DataSource;
use crate::types::{FileSplit, ReaderState};
use std::iter::FusedIterator;

/// Generic key/value record contract of a split-processing host
///
/// Hosts that drive readers through caller-owned key and value buffers can
/// use this trait; everyone else should prefer [`SplitLineReader::into_lines`].
pub trait RecordReader {
    /// Key type
    type Key;
    /// Value type
    type Value;

    /// Allocate a key buffer for [`next`](Self::next)
    fn create_key(&self) -> Self::Key;

    /// Allocate a value buffer for [`next`](Self::next)
    fn create_value(&self) -> Self::Value;

    /// Fill `key` and `value` with the next record; `false` when exhausted
    fn next(&mut self, key: &mut Self::Key, value: &mut Self::Value) -> Result<bool>;

    /// Fraction of the split consumed, in `[0, 1]`
    fn progress(&self) -> f32;

    /// Current position in the input
    fn pos(&self) -> u64;

    /// Release resources; safe to call repeatedly
    fn close(&mut self) -> Result<()>;
}

/// Reads the lines belonging to one [`FileSplit`]
pub struct SplitLineReader {
    split: FileSplit,
    codec: &'static str,
    /// Split start, advanced past the discarded partial line
    start: u64,
    pos: u64,
    end: u64,
    max_line_length: usize,
    lines: Option<LineReader<Box<dyn DecodingFilter>>>,
    state: ReaderState,
}

impl SplitLineReader {
    /// Open a split of a local file
    ///
    /// # Errors
    ///
    /// - [`SplitLineError::UnsupportedFormat`] if no codec matches the path
    /// - [`SplitLineError::InvalidRange`] if the split end overflows
    /// - [`SplitLineError::Io`] if opening or aligning fails
    pub fn open(split: FileSplit, codecs: &CodecRegistry, config: &ReaderConfig) -> Result<Self> {
        let source = DataSource::from_path(&split.path);
        Self::open_source(split, &source, codecs, config)
    }

    /// Open a split whose bytes come from `source`
    ///
    /// The codec is still chosen from `split.path`.
    pub fn open_source(
        split: FileSplit,
        source: &DataSource,
        codecs: &CodecRegistry,
        config: &ReaderConfig,
    ) -> Result<Self> {
        split.checked_end()?;
        let codec = codecs.resolve(&split.path)?;
        let stream = source.open_at(split.start)?;
        let filter = codec.open_decoder(stream, split.start)?;
        Self::with_filter(split, codec.name(), filter, config)
    }

    /// Build a reader over an already opened decoding filter
    ///
    /// `filter` must be positioned to decode from `split.start`.
    pub fn with_filter(
        split: FileSplit,
        codec: &'static str,
        filter: Box<dyn DecodingFilter>,
        config: &ReaderConfig,
    ) -> Result<Self> {
        let end = split.checked_end()?;
        let mut start = split.start;
        let mut lines = LineReader::new(filter);

        tracing::debug!(
            path = %split.path.display(),
            codec,
            start,
            end,
            max_line_length = config.max_line_length,
            "Opening split"
        );

        if start != 0 {
            // Buffer nothing: the line is thrown away
            let mut discarded = Vec::new();
            let skipped = lines.read_line(&mut discarded, 0)?;
            start = lines.position();

            tracing::debug!(
                path = %split.path.display(),
                split_start = split.start,
                skipped,
                aligned_start = start,
                "Discarded leading partial line"
            );
        }

        Ok(Self {
            split,
            codec,
            start,
            pos: start,
            end,
            max_line_length: config.max_line_length,
            lines: Some(lines),
            state: ReaderState::Reading,
        })
    }

    /// Read the next line into `value`
    ///
    /// Returns `Ok(false)` once the split is exhausted, and on every call
    /// after that. An I/O error is returned once; the reader then reports
    /// exhaustion.
    ///
    /// # Errors
    ///
    /// [`SplitLineError::ReaderClosed`] after [`close`](Self::close).
    pub fn next_line(&mut self, value: &mut Vec<u8>) -> Result<bool> {
        let lines = match (self.state, self.lines.as_mut()) {
            (ReaderState::Reading, Some(lines)) => lines,
            (ReaderState::Exhausted, _) => return Ok(false),
            _ => return Err(SplitLineError::ReaderClosed),
        };

        if self.pos > self.end {
            self.state = ReaderState::Exhausted;
            tracing::debug!(
                path = %self.split.path.display(),
                pos = self.pos,
                end = self.end,
                "Split exhausted past end"
            );
            return Ok(false);
        }

        let read = match lines.read_line(value, self.max_line_length) {
            Ok(read) => read,
            Err(e) => {
                self.state = ReaderState::Exhausted;
                return Err(e.into());
            }
        };

        if read == 0 {
            self.state = ReaderState::Exhausted;
            tracing::debug!(
                path = %self.split.path.display(),
                pos = self.pos,
                "Split exhausted at end of stream"
            );
            return Ok(false);
        }

        self.pos = lines.position();
        Ok(true)
    }

    /// Fraction of the split consumed, in `[0, 1]`
    ///
    /// 0 when the (aligned) start is at or past the end, including
    /// zero-length splits.
    pub fn progress(&self) -> f32 {
        if self.start >= self.end {
            0.0
        } else {
            let done = (self.pos - self.start) as f64 / (self.end - self.start) as f64;
            done.min(1.0) as f32
        }
    }

    /// Current compressed-file position
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Start after alignment
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Exclusive split end; never changes
    pub fn end(&self) -> u64 {
        self.end
    }

    /// The split being read
    pub fn split(&self) -> &FileSplit {
        &self.split
    }

    /// Name of the codec decoding this split
    pub fn codec(&self) -> &'static str {
        self.codec
    }

    /// Lifecycle state
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Release the stream; idempotent
    pub fn close(&mut self) {
        if self.lines.take().is_some() {
            tracing::debug!(path = %self.split.path.display(), pos = self.pos, "Closed split");
        }
        self.state = ReaderState::Closed;
    }

    /// Turn the reader into an iterator of line values
    pub fn into_lines(self) -> Lines {
        Lines {
            reader: self,
            done: false,
        }
    }
}

impl RecordReader for SplitLineReader {
    type Key = String;
    type Value = Vec<u8>;

    fn create_key(&self) -> String {
        String::new()
    }

    fn create_value(&self) -> Vec<u8> {
        Vec::new()
    }

    /// The key is always set to the empty string
    fn next(&mut self, key: &mut String, value: &mut Vec<u8>) -> Result<bool> {
        let more = self.next_line(value)?;
        if more {
            key.clear();
        }
        Ok(more)
    }

    fn progress(&self) -> f32 {
        SplitLineReader::progress(self)
    }

    fn pos(&self) -> u64 {
        SplitLineReader::pos(self)
    }

    fn close(&mut self) -> Result<()> {
        SplitLineReader::close(self);
        Ok(())
    }
}

impl std::fmt::Debug for SplitLineReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitLineReader")
            .field("split", &self.split)
            .field("codec", &self.codec)
            .field("start", &self.start)
            .field("pos", &self.pos)
            .field("end", &self.end)
            .field("state", &self.state)
            .finish()
    }
}

/// Lazy, finite sequence of a split's lines
///
/// Stops after the first error.
pub struct Lines {
    reader: SplitLineReader,
    done: bool,
}

impl Lines {
    /// The underlying reader, for position and progress
    pub fn reader(&self) -> &SplitLineReader {
        &self.reader
    }

    /// Recover the reader
    pub fn into_inner(self) -> SplitLineReader {
        self.reader
    }
}

impl Iterator for Lines {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut value = Vec::new();
        match self.reader.next_line(&mut value) {
            Ok(true) => Some(Ok(value)),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Lines {}
