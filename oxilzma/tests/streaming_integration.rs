//! Integration tests for the streaming writers and readers.
//!
//! These cover sync flushes, preset dictionaries, raw LZMA size handling,
//! sticky errors and memory limits.

use oxilzma::{
    FinishableWrite, Lzma2Reader, Lzma2Writer, LzmaError, LzmaOptions, LzmaProperties,
    LzmaReader, LzmaWriter, MemoryUsage, Mode,
};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::io::{self, Cursor, Read, Write};

fn text(len: usize) -> Vec<u8> {
    let base = b"The quick brown fox jumps over the lazy dog. \
                 Pack my box with five dozen liquor jugs. \
                 How vexingly quick daft zebras jump! ";
    base.iter().copied().cycle().take(len).collect()
}

fn read_all<R: Read>(mut reader: R) -> Result<Vec<u8>, LzmaError> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out).map_err(LzmaError::from_io)?;
    Ok(out)
}

/// Sink that fails every write.
struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// LZMA2
// ============================================================================

#[test]
fn test_sync_flush_makes_prefix_decodable() {
    let first = text(50_000);
    let second = text(30_000);
    let options = LzmaOptions::from_preset(6).unwrap().dict_size(1 << 20);

    let mut writer = Lzma2Writer::new(Vec::new(), &options).unwrap();
    writer.write_all(&first).unwrap();
    writer.flush().unwrap();

    // No end marker yet, but everything written so far decodes.
    let partial = writer.get_ref().clone();
    let mut reader = Lzma2Reader::new(Cursor::new(&partial), 1 << 20).unwrap();
    let mut prefix = vec![0u8; first.len()];
    reader.read_exact(&mut prefix).unwrap();
    assert_eq!(prefix, first);

    writer.write_all(&second).unwrap();
    writer.flush().unwrap();
    writer.flush().unwrap();
    let compressed = writer.finish().unwrap();
    assert!(compressed.starts_with(&partial));

    let mut expected = first.clone();
    expected.extend_from_slice(&second);
    let reader = Lzma2Reader::new(Cursor::new(&compressed), 1 << 20).unwrap();
    assert_eq!(read_all(reader).unwrap(), expected);
}

#[test]
fn test_small_reads() {
    let data = text(100_000);
    let options = LzmaOptions::from_preset(2).unwrap();
    let mut writer = Lzma2Writer::new(Vec::new(), &options).unwrap();
    for piece in data.chunks(777) {
        writer.write_all(piece).unwrap();
    }
    let compressed = writer.finish().unwrap();

    let mut reader = Lzma2Reader::new(Cursor::new(&compressed), options.dict_size).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 13];
    loop {
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
}

#[test]
fn test_lzma2_preset_dict() {
    let dict = text(20_000);
    let data = text(25_000);
    let options = LzmaOptions::new().dict_size(1 << 16).preset_dict(dict.clone());

    let mut writer = Lzma2Writer::new(Vec::new(), &options).unwrap();
    writer.write_all(&data).unwrap();
    let compressed = writer.finish().unwrap();

    // Properties are set, the dictionary is not reset.
    assert_eq!(compressed[0] & 0xE0, 0xC0);

    let reader = Lzma2Reader::with_preset_dict(Cursor::new(&compressed), 1 << 16, &dict).unwrap();
    assert_eq!(read_all(reader).unwrap(), data);

    // Without the dictionary the first chunk is invalid.
    let reader = Lzma2Reader::new(Cursor::new(&compressed), 1 << 16).unwrap();
    assert!(read_all(reader).unwrap_err().is_corruption());
}

#[test]
fn test_uncompressed_mode_roundtrip() {
    let data = text(150_000);
    let options = LzmaOptions::new().mode(Mode::Uncompressed);
    let mut writer = Lzma2Writer::new(Vec::new(), &options).unwrap();
    writer.write_all(&data[..1000]).unwrap();
    writer.flush().unwrap();
    writer.write_all(&data[1000..]).unwrap();
    let compressed = writer.finish().unwrap();

    assert_eq!(compressed[0], 0x01);
    assert_eq!(compressed[3 + 1000], 0x02);
    let reader = Lzma2Reader::new(Cursor::new(&compressed), 4096).unwrap();
    assert_eq!(read_all(reader).unwrap(), data);
}

#[test]
fn test_writer_errors_are_sticky() {
    let options = LzmaOptions::new().mode(Mode::Uncompressed);
    let mut writer = Lzma2Writer::new(BrokenSink, &options).unwrap();

    let first = LzmaError::from_io(writer.write_all(&text(70_000)).unwrap_err());
    assert!(matches!(first, LzmaError::Io(_)));

    let second = LzmaError::from_io(writer.write(b"x").unwrap_err());
    assert_eq!(first.to_string(), second.to_string());
    let third = writer.try_finish().unwrap_err();
    assert_eq!(first.to_string(), third.to_string());
}

#[test]
fn test_reader_errors_are_sticky() {
    let options = LzmaOptions::new().dict_size(1 << 16);
    let mut writer = Lzma2Writer::new(Vec::new(), &options).unwrap();
    writer.write_all(&text(10_000)).unwrap();
    let mut compressed = writer.finish().unwrap();
    compressed[0] = 0x80;

    let mut reader = Lzma2Reader::new(Cursor::new(&compressed), 1 << 16).unwrap();
    let mut buf = [0u8; 64];
    let first = LzmaError::from_io(reader.read(&mut buf).unwrap_err());
    let second = LzmaError::from_io(reader.read(&mut buf).unwrap_err());
    assert!(first.is_corruption());
    assert_eq!(first.to_string(), second.to_string());
}

#[test]
fn test_memory_limits() {
    let options = LzmaOptions::from_preset(9).unwrap();
    let needed = options.encoder_memory_usage();
    let err = Lzma2Writer::with_memory_limit(Vec::new(), &options, needed - 1).unwrap_err();
    assert!(matches!(
        err,
        LzmaError::MemoryLimitExceeded { needed_kib, .. } if needed_kib == needed
    ));

    let small = LzmaOptions::from_preset(0).unwrap();
    let writer = Lzma2Writer::with_memory_limit(Vec::new(), &small, 1 << 20).unwrap();
    assert_eq!(writer.memory_usage_kib(), small.encoder_memory_usage());

    let err = Lzma2Reader::with_memory_limit(Cursor::new(&[0u8][..]), 64 << 20, 1024).unwrap_err();
    assert!(matches!(err, LzmaError::MemoryLimitExceeded { .. }));
}

#[test]
fn test_random_data_through_writer() {
    let mut rng = StdRng::seed_from_u64(1234);
    let mut data = vec![0u8; 200_000];
    rng.fill_bytes(&mut data);
    data.extend(text(100_000));

    let options = LzmaOptions::from_preset(3).unwrap();
    let mut writer = Lzma2Writer::new(Vec::new(), &options).unwrap();
    writer.write_all(&data).unwrap();
    let compressed = writer.finish().unwrap();

    let reader = Lzma2Reader::new(Cursor::new(&compressed), options.dict_size).unwrap();
    assert_eq!(read_all(reader).unwrap(), data);
}

// ============================================================================
// Raw LZMA
// ============================================================================

#[test]
fn test_lzma1_known_size() {
    let data = text(60_000);
    let options = LzmaOptions::from_preset(1).unwrap();
    let mut writer = LzmaWriter::new(Vec::new(), &options, false, Some(data.len() as u64)).unwrap();
    writer.write_all(&data).unwrap();
    assert_eq!(writer.uncompressed_size(), data.len() as u64);
    let compressed = writer.finish().unwrap();

    let reader = LzmaReader::new(
        Cursor::new(&compressed),
        options.props(),
        options.dict_size,
        Some(data.len() as u64),
    )
    .unwrap();
    assert_eq!(read_all(reader).unwrap(), data);
}

#[test]
fn test_lzma1_end_marker_leaves_trailing_bytes() {
    let data = text(5_000);
    let options = LzmaOptions::new().dict_size(1 << 16);
    let mut writer = LzmaWriter::new(Vec::new(), &options, true, None).unwrap();
    writer.write_all(&data).unwrap();
    let mut compressed = writer.finish().unwrap();
    let stream_len = compressed.len();
    compressed.extend_from_slice(b"trailer");

    let mut reader =
        LzmaReader::new(Cursor::new(&compressed), LzmaProperties::default(), 1 << 16, None)
            .unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    assert_eq!(reader.into_inner().position() as usize, stream_len);
}

#[test]
fn test_lzma1_preset_dict() {
    let dict = text(8_000);
    let data = text(12_000);
    let options = LzmaOptions::new().dict_size(1 << 16).preset_dict(dict.clone());

    let mut writer = LzmaWriter::new(Vec::new(), &options, true, None).unwrap();
    writer.write_all(&data).unwrap();
    let with_dict = writer.finish().unwrap();

    let plain = oxilzma::compress_lzma1(&data, &options.clone().dict_size(1 << 16)).unwrap();
    let without_dict =
        oxilzma::compress_lzma1(&data, &LzmaOptions::new().dict_size(1 << 16)).unwrap();
    assert_eq!(plain, with_dict);
    assert!(with_dict.len() < without_dict.len());

    let reader = LzmaReader::with_preset_dict(
        Cursor::new(&with_dict),
        options.props(),
        1 << 16,
        None,
        &dict,
    )
    .unwrap();
    assert_eq!(read_all(reader).unwrap(), data);
}

#[test]
fn test_lzma1_truncated() {
    let data = text(30_000);
    let compressed = oxilzma::compress_lzma1(&data, &LzmaOptions::from_preset(0).unwrap()).unwrap();

    let cut = &compressed[..compressed.len() / 2];
    let err = oxilzma::decompress_lzma1(cut, LzmaProperties::default(), 1 << 18, None).unwrap_err();
    assert!(err.is_truncated(), "got {err}");
}
