//! End-to-end partitioning tests
//!
//! Every test cuts a file into contiguous splits, reads each split with its
//! own reader, and checks that the concatenated output equals the file's
//! lines exactly once, in order.

use proptest::prelude::*;
use splitline::io::{scan_block_offsets, BgzfWriter, DataSource};
use splitline::{CodecRegistry, FileSplit, ReaderConfig, SplitLineError, SplitLineReader};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Independent line splitter: `\n`, `\r\n` and `\r` terminate lines
fn reference_lines(data: &[u8]) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\n' => lines.push(std::mem::take(&mut current)),
            b'\r' => {
                lines.push(std::mem::take(&mut current));
                if data.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            b => current.push(b),
        }
        i += 1;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Read `[b0, b1), [b1, b2), ..., [bn, len)` and concatenate the output
fn read_partition(
    path: &Path,
    source: &DataSource,
    boundaries: &[u64],
    len: u64,
) -> splitline::Result<Vec<Vec<u8>>> {
    let codecs = CodecRegistry::default();
    let config = ReaderConfig::default();

    let mut cuts: Vec<u64> = boundaries.to_vec();
    cuts.push(0);
    cuts.push(len);
    cuts.sort_unstable();
    cuts.dedup();

    let mut out = Vec::new();
    for pair in cuts.windows(2) {
        let split = FileSplit::new(path, pair[0], pair[1] - pair[0]);
        let mut reader = SplitLineReader::open_source(split, source, &codecs, &config)?;
        let mut line = Vec::new();
        while reader.next_line(&mut line)? {
            out.push(line.clone());
        }
        reader.close();
    }
    Ok(out)
}

fn bgzf_bytes(data: &[u8], block_data_size: usize) -> Vec<u8> {
    let mut writer = BgzfWriter::with_block_size(Vec::new(), block_data_size);
    writer.write_all(data).unwrap();
    writer.finish().unwrap()
}

fn sample_text() -> Vec<u8> {
    let mut text = Vec::new();
    for i in 0..40 {
        let terminator: &[u8] = match i % 5 {
            0 | 1 => b"\n",
            2 => b"\r\n",
            3 => b"\r",
            _ => b"\n\n",
        };
        text.extend_from_slice(format!("record-{:03}-{}", i, "x".repeat(i % 7)).as_bytes());
        text.extend_from_slice(terminator);
    }
    text.extend_from_slice(b"unterminated tail");
    text
}

#[test]
fn test_spec_scenario_two_splits() {
    init_tracing();
    let mut file = NamedTempFile::with_suffix(".txt").unwrap();
    file.write_all(b"aaa\nbbb\nccc\n").unwrap();
    file.flush().unwrap();

    let codecs = CodecRegistry::default();
    let config = ReaderConfig::default();

    let first = SplitLineReader::open(FileSplit::new(file.path(), 0, 4), &codecs, &config).unwrap();
    let first: Vec<_> = first.into_lines().map(|l| l.unwrap()).collect();
    assert_eq!(first, vec![b"aaa".to_vec(), b"bbb".to_vec()]);

    let second = SplitLineReader::open(FileSplit::new(file.path(), 4, 8), &codecs, &config).unwrap();
    let second: Vec<_> = second.into_lines().map(|l| l.unwrap()).collect();
    assert_eq!(second, vec![b"ccc".to_vec()]);
}

#[test]
fn test_plain_every_single_boundary() {
    let text = sample_text();
    let mut file = NamedTempFile::with_suffix(".txt").unwrap();
    file.write_all(&text).unwrap();
    file.flush().unwrap();

    let source = DataSource::from_path(file.path());
    let len = text.len() as u64;
    let expected = reference_lines(&text);

    for boundary in 0..=len {
        let got = read_partition(file.path(), &source, &[boundary], len).unwrap();
        assert_eq!(got, expected, "boundary at {boundary}");
    }
}

#[test]
fn test_plain_many_small_splits() {
    let text = sample_text();
    let source = DataSource::from_bytes(text.clone());
    let len = text.len() as u64;
    let expected = reference_lines(&text);

    for width in [1u64, 2, 3, 5, 8, 13, 64] {
        let boundaries: Vec<u64> = (0..len).step_by(width as usize).collect();
        let got = read_partition(Path::new("mem.txt"), &source, &boundaries, len).unwrap();
        assert_eq!(got, expected, "split width {width}");
    }
}

#[test]
fn test_bgzf_every_pair_of_block_boundaries() {
    init_tracing();
    let text = sample_text();
    let compressed = bgzf_bytes(&text, 7);

    let mut file = NamedTempFile::with_suffix(".bgz").unwrap();
    file.write_all(&compressed).unwrap();
    file.flush().unwrap();

    let source = DataSource::from_path(file.path());
    let offsets = scan_block_offsets(std::fs::File::open(file.path()).unwrap()).unwrap();
    let len = compressed.len() as u64;
    let expected = reference_lines(&text);

    for (i, &a) in offsets.iter().enumerate() {
        for &b in &offsets[i..] {
            let got = read_partition(file.path(), &source, &[a, b], len).unwrap();
            assert_eq!(got, expected, "boundaries at {a} and {b}");
        }
    }
}

#[test]
fn test_bgzf_every_block_its_own_split() {
    let text = sample_text();
    for block_size in [1usize, 2, 3, 4, 11, 100] {
        let compressed = bgzf_bytes(&text, block_size);
        let source = DataSource::from_bytes(compressed.clone());
        let offsets = scan_block_offsets(&compressed[..]).unwrap();

        let got = read_partition(
            Path::new("mem.bgz"),
            &source,
            &offsets,
            compressed.len() as u64,
        )
        .unwrap();
        assert_eq!(got, reference_lines(&text), "block size {block_size}");
    }
}

#[test]
fn test_bgzf_crlf_straddling_block_boundary() {
    // Hand-built layout: blocks "a\r" | "\nb\r" | "c\n"
    let mut compressed = Vec::new();
    for block in [&b"a\r"[..], b"\nb\r", b"c\n"] {
        let mut bytes = bgzf_bytes(block, block.len());
        bytes.truncate(bytes.len() - splitline::io::bgzf::EOF_MARKER.len());
        compressed.extend(bytes);
    }
    compressed.extend_from_slice(&splitline::io::bgzf::EOF_MARKER);

    let source = DataSource::from_bytes(compressed.clone());
    let offsets = scan_block_offsets(&compressed[..]).unwrap();
    assert_eq!(offsets.len(), 4);
    let len = compressed.len() as u64;
    let expected = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];

    for &boundary in &offsets {
        let got = read_partition(Path::new("mem.bgz"), &source, &[boundary], len).unwrap();
        assert_eq!(got, expected, "boundary at {boundary}");
    }
}

#[test]
fn test_bgzf_empty_blocks_between_data_blocks() {
    // Layout: "one\ntw" | empty | "o\nthree\r" | empty | "\nfour\n" | EOF marker
    let eof = &splitline::io::bgzf::EOF_MARKER[..];
    let mut compressed = Vec::new();
    for block in [&b"one\ntw"[..], b"", b"o\nthree\r", b"", b"\nfour\n"] {
        if block.is_empty() {
            compressed.extend_from_slice(eof);
        } else {
            let mut bytes = bgzf_bytes(block, block.len());
            bytes.truncate(bytes.len() - eof.len());
            compressed.extend(bytes);
        }
    }
    compressed.extend_from_slice(eof);

    let source = DataSource::from_bytes(compressed.clone());
    let offsets = scan_block_offsets(&compressed[..]).unwrap();
    assert_eq!(offsets.len(), 6);
    let len = compressed.len() as u64;
    let expected = vec![
        b"one".to_vec(),
        b"two".to_vec(),
        b"three".to_vec(),
        b"four".to_vec(),
    ];

    for (i, &first) in offsets.iter().enumerate() {
        let got = read_partition(Path::new("mem.bgz"), &source, &[first], len).unwrap();
        assert_eq!(got, expected, "boundary at {first}");

        for &second in &offsets[i + 1..] {
            let got =
                read_partition(Path::new("mem.bgz"), &source, &[first, second], len).unwrap();
            assert_eq!(got, expected, "boundaries at {first} and {second}");
        }
    }
}

#[test]
fn test_bgzf_misaligned_split_fails_at_open() {
    let compressed = bgzf_bytes(b"one\ntwo\nthree\n", 4);
    let source = DataSource::from_bytes(compressed);
    let split = FileSplit::new("mem.bgz", 3, 10);
    let err = SplitLineReader::open_source(
        split,
        &source,
        &CodecRegistry::default(),
        &ReaderConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SplitLineError::Io(ref e) if e.kind() == std::io::ErrorKind::InvalidData));
}

#[test]
fn test_plain_gzip_single_whole_file_split() {
    let mut file = NamedTempFile::with_suffix(".gz").unwrap();
    {
        let mut encoder =
            flate2::write::GzEncoder::new(file.as_file_mut(), flate2::Compression::default());
        encoder.write_all(b"one\ntwo\nthree\n").unwrap();
        encoder.finish().unwrap();
    }
    let len = std::fs::metadata(file.path()).unwrap().len();

    let reader = SplitLineReader::open(
        FileSplit::new(file.path(), 0, len),
        &CodecRegistry::default(),
        &ReaderConfig::default(),
    )
    .unwrap();
    assert_eq!(reader.codec(), "bgzf");
    let lines: Vec<_> = reader.into_lines().map(|l| l.unwrap()).collect();
    assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
}

#[test]
fn test_max_line_length_across_splits() {
    let text = b"short\nthis line is far too long\nok\n".to_vec();
    let source = DataSource::from_bytes(text.clone());
    let config = ReaderConfig::default().with_max_line_length(4);
    let codecs = CodecRegistry::default();

    let mut values = Vec::new();
    for (start, length) in [(0u64, 10u64), (10, text.len() as u64 - 10)] {
        let split = FileSplit::new("mem.txt", start, length);
        let reader = SplitLineReader::open_source(split, &source, &codecs, &config).unwrap();
        for line in reader.into_lines() {
            let line = line.unwrap();
            assert!(line.len() <= 4);
            values.push(line);
        }
    }
    assert_eq!(values, vec![b"shor".to_vec(), b"this".to_vec(), b"ok".to_vec()]);
}

#[test]
fn test_missing_file_is_io_error() {
    let err = SplitLineReader::open(
        FileSplit::new("/nonexistent/splitline/part.bgz", 0, 10),
        &CodecRegistry::default(),
        &ReaderConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SplitLineError::Io(_)));
}

fn text_strategy() -> impl Strategy<Value = Vec<u8>> {
    let piece = prop_oneof![
        "[a-z]{0,12}".prop_map(String::into_bytes),
        Just(b"\n".to_vec()),
        Just(b"\r\n".to_vec()),
        Just(b"\r".to_vec()),
    ];
    prop::collection::vec(piece, 0..60).prop_map(|pieces| pieces.concat())
}

proptest! {
    /// Any contiguous partition of a plain file yields each line once
    #[test]
    fn prop_plain_partition_is_exact(
        text in text_strategy(),
        cuts in prop::collection::vec(0.0f64..1.0, 0..8),
    ) {
        let len = text.len() as u64;
        let boundaries: Vec<u64> = cuts.iter().map(|f| (f * len as f64) as u64).collect();
        let source = DataSource::from_bytes(text.clone());

        let got = read_partition(Path::new("p.txt"), &source, &boundaries, len).unwrap();
        prop_assert_eq!(got, reference_lines(&text));
    }

    /// Any partition of a BGZF file at block boundaries yields each line once
    #[test]
    fn prop_bgzf_partition_is_exact(
        text in text_strategy(),
        block_size in 1usize..24,
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let compressed = bgzf_bytes(&text, block_size);
        let offsets = scan_block_offsets(&compressed[..]).unwrap();
        let boundaries: Vec<u64> = picks.iter().map(|i| *i.get(&offsets)).collect();
        let source = DataSource::from_bytes(compressed.clone());

        let got = read_partition(
            Path::new("p.bgz"),
            &source,
            &boundaries,
            compressed.len() as u64,
        )
        .unwrap();
        prop_assert_eq!(got, reference_lines(&text));
    }

    /// Progress never decreases and stays within [0, 1]
    #[test]
    fn prop_progress_monotonic(
        text in text_strategy(),
        start_frac in 0.0f64..1.0,
        len_frac in 0.0f64..1.0,
    ) {
        let len = text.len() as u64;
        let start = (start_frac * len as f64) as u64;
        let length = (len_frac * (len - start) as f64) as u64;
        let source = DataSource::from_bytes(text);

        let mut reader = SplitLineReader::open_source(
            FileSplit::new("p.txt", start, length),
            &source,
            &CodecRegistry::default(),
            &ReaderConfig::default(),
        )
        .unwrap();

        let mut last = reader.progress();
        prop_assert!((0.0..=1.0).contains(&last));
        let mut line = Vec::new();
        while reader.next_line(&mut line).unwrap() {
            let p = reader.progress();
            prop_assert!((0.0..=1.0).contains(&p));
            prop_assert!(p >= last);
            last = p;
        }
        // Exhaustion is permanent
        prop_assert!(!reader.next_line(&mut line).unwrap());
    }
}
