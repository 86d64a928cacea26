//! Codec resolution and decoding filters
//!
//! A [`Codec`] turns a [`SeekableStream`] opened at a split's start into a
//! [`DecodingFilter`]: a `BufRead` of decoded bytes that also reports how far
//! into the *compressed* file it has consumed. The [`CodecRegistry`] picks a
//! codec from the file's extension.
//!
//! # Position Accounting
//!
//! [`DecodingFilter::position`] is the absolute file offset of the end of the
//! codec unit (for BGZF, the block) that holds the last decoded byte the
//! caller has *consumed*. Filling the buffer alone never moves it. Split
//! boundaries are compared against this value, so it must be in the same
//! on-disk units as [`FileSplit`](crate::FileSplit) offsets.

use crate::error::{Result, SplitLineError};
use crate::io::bgzf::BgzfCodec;
use crate::io::source::SeekableStream;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

/// Decoded byte stream with compressed-offset reporting
pub trait DecodingFilter: BufRead + Send {
    /// Absolute compressed-file offset consumed so far
    fn position(&self) -> u64;
}

impl<D: DecodingFilter + ?Sized> DecodingFilter for Box<D> {
    fn position(&self) -> u64 {
        (**self).position()
    }
}

/// A decoding format selected by file extension
pub trait Codec: Send + Sync + fmt::Debug {
    /// Short format name, used in logs
    fn name(&self) -> &'static str;

    /// File extensions (without the dot, lowercase) handled by this codec
    fn extensions(&self) -> &'static [&'static str];

    /// Build a decoding filter over `stream`, which is positioned at `start`
    ///
    /// Formats with a file-level header may seek to 0 to read it, but must
    /// leave the filter positioned to decode from `start`.
    fn open_decoder(
        &self,
        stream: Box<dyn SeekableStream>,
        start: u64,
    ) -> Result<Box<dyn DecodingFilter>>;
}

/// Identity codec for uncompressed text
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl Codec for PlainCodec {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "csv", "tsv", "log"]
    }

    fn open_decoder(
        &self,
        stream: Box<dyn SeekableStream>,
        start: u64,
    ) -> Result<Box<dyn DecodingFilter>> {
        Ok(Box::new(PlainDecoder::new(stream, start)))
    }
}

/// Pass-through filter whose position advances byte by byte
pub struct PlainDecoder<S> {
    inner: BufReader<S>,
    position: u64,
}

impl<S: Read> PlainDecoder<S> {
    /// Wrap a stream that is currently at `start`
    pub fn new(stream: S, start: u64) -> Self {
        Self {
            inner: BufReader::new(stream),
            position: start,
        }
    }
}

impl<S: Read> Read for PlainDecoder<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl<S: Read> BufRead for PlainDecoder<S> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.position += amt as u64;
    }
}

impl<S: Read + Send> DecodingFilter for PlainDecoder<S> {
    fn position(&self) -> u64 {
        self.position
    }
}

/// Extension-keyed codec lookup
///
/// # Example
///
/// ```
/// use splitline::io::CodecRegistry;
///
/// let codecs = CodecRegistry::default();
/// assert_eq!(codecs.codec_for_path("reads/part-7.log.BGZ").unwrap().name(), "bgzf");
/// assert!(codecs.codec_for_path("archive.zst").is_none());
/// ```
#[derive(Clone)]
pub struct CodecRegistry {
    by_extension: HashMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Create a registry with no codecs
    pub fn new() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Register a codec for all of its extensions
    ///
    /// A later registration for the same extension replaces the earlier one.
    pub fn register<C: Codec + 'static>(&mut self, codec: C) -> &mut Self {
        let codec: Arc<dyn Codec> = Arc::new(codec);
        for ext in codec.extensions() {
            self.by_extension
                .insert(ext.to_ascii_lowercase(), Arc::clone(&codec));
        }
        self
    }

    /// Look up the codec for a path by its last extension
    pub fn codec_for_path<P: AsRef<Path>>(&self, path: P) -> Option<Arc<dyn Codec>> {
        let ext = path.as_ref().extension()?.to_str()?;
        self.by_extension
            .get(&ext.to_ascii_lowercase())
            .map(Arc::clone)
    }

    /// Look up the codec for a path, failing if none matches
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> Result<Arc<dyn Codec>> {
        let path = path.as_ref();
        self.codec_for_path(path)
            .ok_or_else(|| SplitLineError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
    }

    /// Number of registered extensions
    pub fn len(&self) -> usize {
        self.by_extension.len()
    }

    /// Whether no codec is registered
    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}

impl Default for CodecRegistry {
    /// BGZF and plain text
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(BgzfCodec).register(PlainCodec);
        registry
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<_> = self
            .by_extension
            .iter()
            .map(|(ext, codec)| (ext.as_str(), codec.name()))
            .collect();
        extensions.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}
