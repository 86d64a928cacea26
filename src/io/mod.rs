//! I/O layers beneath the split reader
//!
//! Leaves first: a [`SeekableStream`] over a [`DataSource`], a
//! [`DecodingFilter`] chosen through the [`CodecRegistry`], and a
//! [`LineReader`] tokenizing decoded bytes.

pub mod bgzf;
pub mod codec;
pub mod line;
pub mod source;

pub use bgzf::{scan_block_offsets, BgzfCodec, BgzfDecoder, BgzfWriter};
pub use codec::{Codec, CodecRegistry, DecodingFilter, PlainCodec, PlainDecoder};
pub use line::{LineReader, LineTokenizer};
pub use source::{DataSource, PositionedStream, SeekableStream, MMAP_THRESHOLD};
