//! Seekable byte sources
//!
//! A split reader needs three things from the storage layer: open a file at
//! an absolute offset, seek, and report the absolute offset of the next byte
//! it will hand out. [`SeekableStream`] is that capability and
//! [`DataSource`] knows how to produce one for a local file or an in-memory
//! buffer.
//!
//! # I/O Method Selection
//!
//! Local files at or above [`MMAP_THRESHOLD`] are memory-mapped; smaller
//! files go through a buffered `File`, where the mapping overhead outweighs
//! the page-cache benefit.

use crate::error::Result;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Memory-mapped file threshold (50 MB)
pub const MMAP_THRESHOLD: u64 = 50 * 1024 * 1024;

/// A byte stream that can be repositioned and reports its absolute offset
pub trait SeekableStream: Read + Send {
    /// Move to an absolute offset
    fn seek_to(&mut self, offset: u64) -> io::Result<()>;

    /// Absolute offset of the next byte `read` will return
    fn position(&self) -> u64;
}

impl<S: SeekableStream + ?Sized> SeekableStream for Box<S> {
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        (**self).seek_to(offset)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }
}

/// Adapts any `Read + Seek` into a [`SeekableStream`]
///
/// The position is counted from the bytes returned by `read`, so read-ahead
/// buffering inside `R` does not leak into it.
#[derive(Debug)]
pub struct PositionedStream<R> {
    inner: R,
    position: u64,
}

impl<R: Read + Seek> PositionedStream<R> {
    /// Wrap `inner` and move it to `offset`
    pub fn open_at(mut inner: R, offset: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            inner,
            position: offset,
        })
    }

    /// Get the wrapped reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for PositionedStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek + Send> SeekableStream for PositionedStream<R> {
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Where split bytes come from
///
/// # Example
///
/// ```
/// use splitline::io::{DataSource, SeekableStream};
/// use std::io::Read;
///
/// # fn main() -> splitline::Result<()> {
/// let source = DataSource::from_bytes(b"aaa\nbbb\n".to_vec());
/// let mut stream = source.open_at(4)?;
///
/// let mut buf = String::new();
/// stream.read_to_string(&mut buf)?;
/// assert_eq!(buf, "bbb\n");
/// assert_eq!(stream.position(), 8);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub enum DataSource {
    /// Local file path
    Local(PathBuf),

    /// Bytes already held in memory
    Memory(Arc<[u8]>),
}

impl DataSource {
    /// Create a local file data source
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        DataSource::Local(path.as_ref().to_path_buf())
    }

    /// Create an in-memory data source
    pub fn from_bytes<B: Into<Arc<[u8]>>>(bytes: B) -> Self {
        DataSource::Memory(bytes.into())
    }

    /// Total length in bytes
    pub fn len(&self) -> Result<u64> {
        match self {
            DataSource::Local(path) => Ok(std::fs::metadata(path)?.len()),
            DataSource::Memory(bytes) => Ok(bytes.len() as u64),
        }
    }

    /// Whether the source holds no bytes
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Open the source positioned at an absolute offset
    pub fn open_at(&self, offset: u64) -> Result<Box<dyn SeekableStream>> {
        match self {
            DataSource::Local(path) => open_local_file(path, offset, MMAP_THRESHOLD),
            DataSource::Memory(bytes) => Ok(Box::new(PositionedStream::open_at(
                Cursor::new(Arc::clone(bytes)),
                offset,
            )?)),
        }
    }
}

/// Open a local file, memory-mapping it when it has at least `mmap_threshold` bytes
fn open_local_file(
    path: &Path,
    offset: u64,
    mmap_threshold: u64,
) -> Result<Box<dyn SeekableStream>> {
    let file_size = std::fs::metadata(path)?.len();

    if file_size >= mmap_threshold {
        let mmap = open_mmap_file(path)?;
        Ok(Box::new(PositionedStream::open_at(Cursor::new(mmap), offset)?))
    } else {
        let file = File::open(path)?;
        Ok(Box::new(PositionedStream::open_at(
            BufReader::new(file),
            offset,
        )?))
    }
}

/// Map a file with sequential-access hints
#[cfg(target_os = "macos")]
fn open_mmap_file(path: &Path) -> io::Result<Mmap> {
    use libc::{madvise, MADV_SEQUENTIAL, MADV_WILLNEED};

    let file = File::open(path)?;
    // SAFETY: the mapping is read-only; concurrent truncation by another
    // process is outside what this crate can guard against.
    let mmap = unsafe { Mmap::map(&file)? };

    unsafe {
        madvise(
            mmap.as_ptr() as *mut _,
            mmap.len(),
            MADV_SEQUENTIAL | MADV_WILLNEED,
        );
    }

    Ok(mmap)
}

#[cfg(not(target_os = "macos"))]
fn open_mmap_file(path: &Path) -> io::Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: see the macOS variant.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}
