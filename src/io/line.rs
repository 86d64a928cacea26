//! Bounded line tokenizer
//!
//! [`LineReader`] pulls one line at a time from a [`DecodingFilter`]. A line
//! ends at `\n`, `\r\n` or a bare `\r`; the terminator is consumed but not
//! returned.
//!
//! # Over-long Lines
//!
//! At most `max_line_length` bytes of a line are kept. The rest of the line,
//! through its terminator, is still consumed and discarded, so the next call
//! starts on the following line. The count returned is always the number of
//! bytes consumed, which is what callers use to tell an empty line (1 or 2)
//! from the end of the stream (0).
//!
//! # Terminators Across Buffers
//!
//! When a `\r` is the last byte the filter has buffered, the reader fills the
//! next buffer to look for a `\n` and consumes it only if present. Looking
//! without consuming does not move [`DecodingFilter::position`].

use crate::io::codec::DecodingFilter;
use std::io;

/// Source of length-bounded lines
pub trait LineTokenizer {
    /// Read the next line into `line`, replacing its contents
    ///
    /// Returns the number of bytes consumed from the stream, including the
    /// terminator and any bytes dropped past `max_line_length`; 0 means the
    /// stream is exhausted.
    fn read_line(&mut self, line: &mut Vec<u8>, max_line_length: usize) -> io::Result<usize>;

    /// Compressed-file position of the underlying filter
    fn position(&self) -> u64;
}

/// What to do after consuming part of the buffer
enum Step {
    /// No terminator yet
    More,
    /// Line complete
    Done,
    /// Line ended with `\r` as the last buffered byte; a `\n` may follow
    CrAtBufferEnd,
}

/// Line reader over a decoding filter
///
/// # Example
///
/// ```
/// use splitline::io::{Codec, DataSource, LineReader, LineTokenizer, PlainCodec};
///
/// # fn main() -> splitline::Result<()> {
/// let source = DataSource::from_bytes(b"short\na much longer line\r\n".to_vec());
/// let filter = PlainCodec.open_decoder(source.open_at(0)?, 0)?;
/// let mut lines = LineReader::new(filter);
///
/// let mut line = Vec::new();
/// assert_eq!(lines.read_line(&mut line, 8)?, 6);
/// assert_eq!(line, b"short");
/// assert_eq!(lines.read_line(&mut line, 8)?, 20);
/// assert_eq!(line, b"a much l");
/// assert_eq!(lines.read_line(&mut line, 8)?, 0);
/// # Ok(())
/// # }
/// ```
pub struct LineReader<R> {
    inner: R,
}

impl<R: DecodingFilter> LineReader<R> {
    /// Create a line reader
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Get the wrapped filter
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Consume a `\n` immediately following a `\r`, if one is there
    fn consume_lf_after_cr(&mut self) -> io::Result<usize> {
        let next = loop {
            match self.inner.fill_buf() {
                Ok(buf) => break buf.first().copied(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if next == Some(b'\n') {
            self.inner.consume(1);
            Ok(1)
        } else {
            Ok(0)
        }
    }
}

/// Append as much of `bytes` as `max_line_length` allows
fn append_bounded(line: &mut Vec<u8>, bytes: &[u8], max_line_length: usize) {
    let room = max_line_length.saturating_sub(line.len());
    let take = bytes.len().min(room);
    line.extend_from_slice(&bytes[..take]);
}

impl<R: DecodingFilter> LineTokenizer for LineReader<R> {
    fn read_line(&mut self, line: &mut Vec<u8>, max_line_length: usize) -> io::Result<usize> {
        line.clear();
        let mut consumed = 0usize;

        loop {
            let (used, step) = {
                let available = match self.inner.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                if available.is_empty() {
                    return Ok(consumed);
                }

                match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                    Some(i) => {
                        append_bounded(line, &available[..i], max_line_length);
                        match (available[i], available.get(i + 1).copied()) {
                            (b'\r', Some(b'\n')) => (i + 2, Step::Done),
                            (b'\r', None) => (i + 1, Step::CrAtBufferEnd),
                            _ => (i + 1, Step::Done),
                        }
                    }
                    None => {
                        append_bounded(line, available, max_line_length);
                        (available.len(), Step::More)
                    }
                }
            };

            self.inner.consume(used);
            consumed += used;

            match step {
                Step::More => {}
                Step::Done => return Ok(consumed),
                Step::CrAtBufferEnd => {
                    consumed += self.consume_lf_after_cr()?;
                    return Ok(consumed);
                }
            }
        }
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }
}
