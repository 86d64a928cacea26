//! BGZF: block-compressed gzip
//!
//! BGZF files are a series of independent gzip members ("blocks"), each
//! decompressing to at most 64 KB and carrying its own compressed size in a
//! `BC` extra subfield. Any block start is a valid place to begin decoding,
//! which is what makes the format splittable.
//!
//! # Block Structure
//!
//! - Bytes 0-1: gzip magic (31, 139)
//! - Byte 2: CM = 8 (deflate)
//! - Byte 3: FLG, with FEXTRA (0x04) set
//! - Bytes 10-11: XLEN (little-endian)
//! - Extra subfields, one of which is SI1='B', SI2='C', SLEN=2,
//!   BSIZE = total block size - 1 (little-endian u16)
//! - Deflate payload, CRC32, ISIZE
//!
//! # Splits
//!
//! [`BgzfDecoder`] reports the end offset of the block holding the last
//! consumed byte, so a split's start must be a block start. Use
//! [`scan_block_offsets`] to find them.

use crate::error::{Result, SplitLineError};
use crate::io::codec::{Codec, DecodingFilter};
use crate::io::source::SeekableStream;
use flate2::bufread::MultiGzDecoder;
use flate2::read::GzDecoder;
use rayon::prelude::*;
use std::io::{self, BufRead, BufReader, Read, Write};

/// gzip magic bytes
const GZIP_MAGIC: [u8; 2] = [31, 139];

/// Fixed gzip header length, up to and including XLEN
const FIXED_HEADER_LEN: usize = 12;

/// CRC32 + ISIZE trailer length
const TRAILER_LEN: usize = 8;

/// Largest compressed block BSIZE can describe
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// Default uncompressed bytes per written block
///
/// Leaves headroom so incompressible input still fits in [`MAX_BLOCK_SIZE`]
/// once deflate framing is added.
pub const DEFAULT_BLOCK_DATA_SIZE: usize = 60 * 1024;

/// Decoded bytes served at a time from a plain gzip stream
pub const STREAM_CHUNK_SIZE: usize = MAX_BLOCK_SIZE;

/// Number of blocks compressed together by [`BgzfWriter`]
pub const PARALLEL_BLOCK_COUNT: usize = 8;

/// Standard 28-byte BGZF end-of-file marker (an empty block)
pub const EOF_MARKER: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // Header
    6, 0, 66, 67, 2, 0, 27, 0, // Extra field with BSIZE=27
    3, 0, // Empty deflate block
    0, 0, 0, 0, // CRC32
    0, 0, 0, 0, // ISIZE
];

/// Codec for `.bgz`, `.bgzf` and `.gz` files
#[derive(Debug, Clone, Copy, Default)]
pub struct BgzfCodec;

impl Codec for BgzfCodec {
    fn name(&self) -> &'static str {
        "bgzf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["bgz", "bgzf", "gz"]
    }

    fn open_decoder(
        &self,
        stream: Box<dyn SeekableStream>,
        _start: u64,
    ) -> Result<Box<dyn DecodingFilter>> {
        Ok(Box::new(BgzfDecoder::new(stream)))
    }
}

/// How a raw block must be inflated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    /// One BGZF block
    Bgzf,
    /// Plain gzip without BSIZE; nothing past the header has been read
    WholeStream,
}

/// Read until `buf` is full or EOF, returning bytes read
fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Find BSIZE in the extra field
fn find_bsize(extra: &[u8]) -> io::Result<Option<u16>> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let si1 = extra[pos];
        let si2 = extra[pos + 1];
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;

        if si1 == b'B' && si2 == b'C' && slen == 2 {
            if pos + 6 > extra.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Incomplete BSIZE field",
                ));
            }
            return Ok(Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]])));
        }

        pos += 4 + slen;
    }
    Ok(None)
}

/// Read one raw block into `out`
///
/// Returns `None` on a clean EOF (no bytes at all before the next header).
/// `offset` is the absolute position of the block, used in error messages.
/// For [`BlockKind::WholeStream`] only the header has been read.
fn read_raw_block<R: Read + ?Sized>(
    reader: &mut R,
    offset: u64,
    out: &mut Vec<u8>,
) -> io::Result<Option<BlockKind>> {
    out.clear();

    let mut header = [0u8; FIXED_HEADER_LEN];
    match read_up_to(reader, &mut header)? {
        0 => return Ok(None),
        FIXED_HEADER_LEN => {}
        n => {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Truncated gzip header at offset {} ({} bytes)", offset, n),
            ))
        }
    }

    if header[..2] != GZIP_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "No BGZF block at offset {}: expected [31, 139], got [{}, {}]",
                offset, header[0], header[1]
            ),
        ));
    }

    out.extend_from_slice(&header);

    // No extra field: regular gzip
    if header[3] & 0x04 == 0 {
        return Ok(Some(BlockKind::WholeStream));
    }

    let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
    let mut extra = vec![0u8; xlen];
    reader.read_exact(&mut extra)?;
    out.extend_from_slice(&extra);

    let block_size = match find_bsize(&extra)? {
        Some(bsize) => bsize as usize + 1,
        None => return Ok(Some(BlockKind::WholeStream)),
    };

    let already_read = FIXED_HEADER_LEN + xlen;
    if block_size < already_read + TRAILER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Invalid block size {} at offset {} (header alone is {} bytes)",
                block_size, offset, already_read
            ),
        ));
    }

    let remaining = block_size - already_read;
    let body_start = out.len();
    out.resize(body_start + remaining, 0);
    reader.read_exact(&mut out[body_start..])?;

    Ok(Some(BlockKind::Bgzf))
}

/// Inflate a raw BGZF block, replacing the contents of `out`
fn decompress_block(raw: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
    out.clear();
    GzDecoder::new(raw).read_to_end(out)?;
    Ok(())
}

/// Inflate up to [`STREAM_CHUNK_SIZE`] bytes from a gzip stream into `out`
fn inflate_chunk<R: BufRead>(
    decoder: &mut MultiGzDecoder<R>,
    out: &mut Vec<u8>,
) -> io::Result<()> {
    out.resize(STREAM_CHUNK_SIZE, 0);
    let n = read_up_to(decoder, out)?;
    out.truncate(n);
    Ok(())
}

/// Compressed bytes the gzip stream has taken from the underlying stream
fn stream_offset<S: SeekableStream>(decoder: &MultiGzDecoder<BufReader<S>>) -> u64 {
    let buffered = decoder.get_ref();
    buffered.get_ref().position() - buffered.buffer().len() as u64
}

/// Where decoded bytes come from
enum Inflater<S> {
    /// BGZF blocks, read and inflated one at a time
    Blocks(S),
    /// Plain gzip, inflated incrementally
    Stream(MultiGzDecoder<BufReader<S>>),
    /// Only observable if switching to `Stream` was interrupted
    Detached,
}

/// Sequential BGZF decoding filter
///
/// Decodes exactly one block at a time, so the reported position always
/// corresponds to the block holding the last consumed byte.
///
/// Plain gzip members (no `BC` subfield) cannot be located mid-file, so from
/// the first such member on the rest of the stream is inflated as one
/// multi-member gzip stream, served in chunks of [`STREAM_CHUNK_SIZE`]. The
/// position is then the compressed offset consumed when the chunk holding the
/// last consumed byte was produced. Only a split starting at 0 can read such a
/// file.
///
/// # Example
///
/// ```
/// use splitline::io::{BgzfDecoder, BgzfWriter, DataSource};
/// use std::io::{Read, Write};
///
/// # fn main() -> splitline::Result<()> {
/// let mut writer = BgzfWriter::new(Vec::new());
/// writer.write_all(b"one\ntwo\n")?;
/// let compressed = writer.finish()?;
///
/// let source = DataSource::from_bytes(compressed);
/// let mut decoder = BgzfDecoder::new(source.open_at(0)?);
/// let mut text = String::new();
/// decoder.read_to_string(&mut text)?;
/// assert_eq!(text, "one\ntwo\n");
/// # Ok(())
/// # }
/// ```
pub struct BgzfDecoder<S> {
    inflater: Inflater<S>,
    /// Raw bytes of the block being decoded (reused)
    compressed: Vec<u8>,
    /// Decoded bytes of the current block or chunk
    block: Vec<u8>,
    /// Read position within `block`
    block_pos: usize,
    /// Absolute offset just past the current block
    block_end: u64,
    /// Reported position
    position: u64,
    eof: bool,
}

impl<S: SeekableStream> BgzfDecoder<S> {
    /// Create a decoder reading blocks from the stream's current position
    pub fn new(stream: S) -> Self {
        let start = stream.position();
        Self {
            inflater: Inflater::Blocks(stream),
            compressed: Vec::with_capacity(MAX_BLOCK_SIZE),
            block: Vec::with_capacity(MAX_BLOCK_SIZE),
            block_pos: 0,
            block_end: start,
            position: start,
            eof: false,
        }
    }

    /// Load and inflate the next block, or the next chunk of a gzip stream
    fn load_next_block(&mut self) -> io::Result<()> {
        self.block_pos = 0;

        let stream = match &mut self.inflater {
            Inflater::Blocks(stream) => stream,
            Inflater::Stream(decoder) => {
                inflate_chunk(decoder, &mut self.block).map_err(|e| {
                    io::Error::new(
                        e.kind(),
                        format!(
                            "Failed to inflate gzip stream near offset {}: {}",
                            self.block_end, e
                        ),
                    )
                })?;
                self.block_end = stream_offset(decoder);
                if self.block.is_empty() {
                    self.eof = true;
                }
                tracing::trace!(
                    compressed_offset = self.block_end,
                    decoded = self.block.len(),
                    "Inflated gzip chunk"
                );
                return Ok(());
            }
            Inflater::Detached => return Err(io::Error::other("BGZF decoder lost its stream")),
        };

        let offset = stream.position();
        let kind = match read_raw_block(stream, offset, &mut self.compressed)? {
            Some(kind) => kind,
            None => {
                self.eof = true;
                self.block.clear();
                return Ok(());
            }
        };

        if kind == BlockKind::WholeStream {
            // Rewind over the header so the gzip decoder sees the whole member
            stream.seek_to(offset)?;
            self.compressed.clear();
            self.block.clear();
            let detached = std::mem::replace(&mut self.inflater, Inflater::Detached);
            if let Inflater::Blocks(stream) = detached {
                self.inflater = Inflater::Stream(MultiGzDecoder::new(BufReader::new(stream)));
            }
            tracing::debug!(offset, "Plain gzip member, inflating the rest as one stream");
            return Ok(());
        }

        decompress_block(&self.compressed, &mut self.block).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Failed to inflate block at offset {}: {}", offset, e),
            )
        })?;
        self.block_end = stream.position();

        tracing::trace!(
            offset,
            compressed = self.compressed.len(),
            decoded = self.block.len(),
            "Loaded BGZF block"
        );
        Ok(())
    }
}

impl<S: SeekableStream> BufRead for BgzfDecoder<S> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        // Empty blocks (including the EOF marker) are skipped
        while self.block_pos >= self.block.len() {
            if self.eof {
                return Ok(&[]);
            }
            self.load_next_block()?;
        }
        Ok(&self.block[self.block_pos..])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.block.len() - self.block_pos);
        if amt > 0 {
            self.block_pos += amt;
            self.position = self.block_end;
        }
    }
}

impl<S: SeekableStream> Read for BgzfDecoder<S> {
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

impl<S: SeekableStream> DecodingFilter for BgzfDecoder<S> {
    fn position(&self) -> u64 {
        self.position
    }
}

/// List the start offset of every block in a BGZF stream
///
/// Walks block headers only; payloads are skipped without inflating. The
/// returned offsets are relative to where `reader` starts. The trailing EOF
/// marker, if present, is included like any other block.
///
/// # Errors
///
/// Fails with [`SplitLineError::Compression`] if a gzip member has no `BC`
/// subfield (the file is plain gzip and cannot be split) or the stream is
/// malformed.
pub fn scan_block_offsets<R: Read>(mut reader: R) -> Result<Vec<u64>> {
    let mut offsets = Vec::new();
    let mut offset = 0u64;
    let mut header = [0u8; FIXED_HEADER_LEN];

    loop {
        match read_up_to(&mut reader, &mut header)? {
            0 => break,
            FIXED_HEADER_LEN => {}
            n => {
                return Err(SplitLineError::Compression(format!(
                    "Incomplete gzip header at offset {} (only {} bytes remaining)",
                    offset, n
                )))
            }
        }

        if header[..2] != GZIP_MAGIC {
            return Err(SplitLineError::Compression(format!(
                "Invalid gzip magic bytes at offset {}: expected [31, 139], got [{}, {}]",
                offset, header[0], header[1]
            )));
        }

        if header[3] & 0x04 == 0 {
            return Err(SplitLineError::Compression(format!(
                "gzip member at offset {} has no extra field; not BGZF",
                offset
            )));
        }

        let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
        let mut extra = vec![0u8; xlen];
        reader.read_exact(&mut extra)?;

        let block_size = match find_bsize(&extra)? {
            Some(bsize) => bsize as u64 + 1,
            None => {
                return Err(SplitLineError::Compression(format!(
                    "gzip member at offset {} has no BSIZE subfield; not BGZF",
                    offset
                )))
            }
        };

        let already_read = (FIXED_HEADER_LEN + xlen) as u64;
        if block_size < already_read + TRAILER_LEN as u64 {
            return Err(SplitLineError::Compression(format!(
                "Invalid block size {} at offset {}",
                block_size, offset
            )));
        }

        let skip = block_size - already_read;
        let skipped = io::copy(&mut (&mut reader).take(skip), &mut io::sink())?;
        if skipped != skip {
            return Err(SplitLineError::Compression(format!(
                "Block size {} at offset {} exceeds remaining data",
                block_size, offset
            )));
        }

        offsets.push(offset);
        offset += block_size;
    }

    Ok(offsets)
}

/// Parallel BGZF writer
///
/// # Architecture
///
/// 1. Buffer input until [`PARALLEL_BLOCK_COUNT`] blocks are full
/// 2. Compress them in parallel with rayon
/// 3. Write the compressed blocks in order
///
/// Memory stays bounded at roughly two batches of blocks regardless of
/// output size. [`finish`](Self::finish) must be called to flush the last
/// partial block and write the EOF marker.
pub struct BgzfWriter<W: Write> {
    writer: W,
    /// Full uncompressed blocks waiting to be compressed
    uncompressed_blocks: Vec<Vec<u8>>,
    /// Block currently being filled
    current_block: Vec<u8>,
    block_data_size: usize,
    /// Total uncompressed bytes accepted
    bytes_written: u64,
}

impl<W: Write> BgzfWriter<W> {
    /// Create a writer with the default block size
    pub fn new(writer: W) -> Self {
        Self::with_block_size(writer, DEFAULT_BLOCK_DATA_SIZE)
    }

    /// Create a writer emitting blocks of at most `block_data_size` uncompressed bytes
    ///
    /// The size is clamped to `1..=DEFAULT_BLOCK_DATA_SIZE`.
    pub fn with_block_size(writer: W, block_data_size: usize) -> Self {
        let block_data_size = block_data_size.clamp(1, DEFAULT_BLOCK_DATA_SIZE);
        Self {
            writer,
            uncompressed_blocks: Vec::with_capacity(PARALLEL_BLOCK_COUNT),
            current_block: Vec::with_capacity(block_data_size),
            block_data_size,
            bytes_written: 0,
        }
    }

    /// Total uncompressed bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Compress a single block to BGZF format
    fn compress_block(data: &[u8]) -> io::Result<Vec<u8>> {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;

        let mut deflate = DeflateEncoder::new(Vec::new(), Compression::default());
        deflate.write_all(data)?;
        let deflated = deflate.finish()?;

        let crc = crc32fast::hash(data);
        let isize = data.len() as u32;

        let mut block = Vec::with_capacity(18 + deflated.len() + TRAILER_LEN);
        block.extend_from_slice(&[31, 139, 8, 4, 0, 0, 0, 0, 0, 255]);
        block.extend_from_slice(&6u16.to_le_bytes()); // XLEN
        block.extend_from_slice(&[b'B', b'C']);
        block.extend_from_slice(&2u16.to_le_bytes()); // SLEN
        let bsize_pos = block.len();
        block.extend_from_slice(&0u16.to_le_bytes());
        block.extend_from_slice(&deflated);
        block.extend_from_slice(&crc.to_le_bytes());
        block.extend_from_slice(&isize.to_le_bytes());

        if block.len() > MAX_BLOCK_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Compressed block of {} bytes exceeds BGZF limit", block.len()),
            ));
        }
        let bsize = (block.len() - 1) as u16;
        block[bsize_pos..bsize_pos + 2].copy_from_slice(&bsize.to_le_bytes());

        Ok(block)
    }

    /// Compress and write all pending blocks
    fn flush_blocks(&mut self) -> io::Result<()> {
        if self.uncompressed_blocks.is_empty() {
            return Ok(());
        }

        let compressed_blocks: Vec<_> = self
            .uncompressed_blocks
            .par_iter()
            .map(|block| Self::compress_block(block))
            .collect::<io::Result<Vec<_>>>()?;

        for block in compressed_blocks {
            self.writer.write_all(&block)?;
        }

        self.uncompressed_blocks.clear();
        Ok(())
    }

    /// Flush remaining data, write the EOF marker and return the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        if !self.current_block.is_empty() {
            let block = std::mem::take(&mut self.current_block);
            self.uncompressed_blocks.push(block);
        }
        self.flush_blocks()?;
        self.writer.write_all(&EOF_MARKER)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;

        while !remaining.is_empty() {
            let space_in_block = self.block_data_size - self.current_block.len();
            let to_copy = remaining.len().min(space_in_block);

            self.current_block.extend_from_slice(&remaining[..to_copy]);
            remaining = &remaining[to_copy..];

            if self.current_block.len() >= self.block_data_size {
                let block = std::mem::replace(
                    &mut self.current_block,
                    Vec::with_capacity(self.block_data_size),
                );
                self.uncompressed_blocks.push(block);

                if self.uncompressed_blocks.len() >= PARALLEL_BLOCK_COUNT {
                    self.flush_blocks()?;
                }
            }
        }

        self.bytes_written += buf.len() as u64;
        Ok(buf.len())
    }

    /// Flushes the inner writer only; buffered blocks are written by `finish`
    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

// ============================================================================
// TESTS
// ============================================================================
