//! Raw LZMA1 streams.
//!
//! A raw stream is one range coder run with no framing at all. The
//! properties, the dictionary size and either the uncompressed size or the
//! promise of an end marker travel out of band.

use crate::decoder::LzmaDecoder;
use crate::encoder::{EncoderConfig, LzmaEncoder};
use crate::lz::LzDecoder;
use crate::lzma2::READER_DICT_SIZE_MAX;
use crate::model::{LC_MAX, LP_MAX, LzmaProperties};
use crate::options::{
    LzmaOptions, Mode, PB_MAX, check_memory_limit, literal_memory_usage,
    lzma_decoder_memory_usage, lzma_reader_dict_size,
};
use crate::range_coder::{RangeDecoder, StreamSource};
use oxilzma_core::error::{LzmaError, Result};
use oxilzma_core::traits::{FinishableWrite, MemoryUsage};
use std::io::{self, Read, Write};
use tracing::{debug, trace};

/// Streaming raw LZMA1 compressor.
///
/// LZMA1 has no sync points, so [`flush`](Write::flush) fails. The first
/// error is remembered and returned by every later call.
#[derive(Debug)]
pub struct LzmaWriter<W: Write> {
    inner: W,
    lzma: Box<LzmaEncoder>,
    end_marker: bool,
    expected_size: Option<u64>,
    current_size: u64,
    error: Option<LzmaError>,
    finished: bool,
    memory_kib: u64,
}

impl<W: Write> LzmaWriter<W> {
    /// Create a writer compressing into `inner`.
    ///
    /// With `end_marker` the stream ends in a marker symbol, which a reader
    /// needs when it does not know the uncompressed size. A known
    /// `expected_size` is enforced: writing more, or finishing with less,
    /// fails.
    pub fn new(
        inner: W,
        options: &LzmaOptions,
        end_marker: bool,
        expected_size: Option<u64>,
    ) -> Result<Self> {
        options.validate()?;
        if options.mode == Mode::Uncompressed {
            return Err(LzmaError::unsupported(
                "raw LZMA streams cannot be stored uncompressed",
            ));
        }

        let config = EncoderConfig {
            mode: options.mode,
            dict_size: options.dict_size,
            extra_before: 0,
            nice_len: options.nice_len,
            match_finder: options.match_finder,
            depth_limit: options.depth_limit,
        };
        let mut lzma = Box::new(LzmaEncoder::new(options.props(), &config));

        if let Some(dict) = options.preset_dict.as_deref().filter(|d| !d.is_empty()) {
            lzma.lz_mut().set_preset_dict(options.dict_size, dict);
        }

        let memory_kib = literal_memory_usage(options.lc, options.lp)
            + LzmaEncoder::memory_usage(options.mode, options.dict_size, 0, options.match_finder);

        debug!(
            mode = ?options.mode,
            dict_size = options.dict_size,
            end_marker,
            expected_size,
            "created LZMA writer"
        );

        Ok(Self {
            inner,
            lzma,
            end_marker,
            expected_size,
            current_size: 0,
            error: None,
            finished: false,
            memory_kib,
        })
    }

    /// Properties the reader has to be given.
    pub fn props(&self) -> LzmaProperties {
        self.lzma.props()
    }

    /// Bytes accepted so far.
    pub fn uncompressed_size(&self) -> u64 {
        self.current_size
    }

    /// The underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    fn check_usable(&self) -> Result<()> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.finished {
            return Err(LzmaError::Finished);
        }
        Ok(())
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.error = Some(err.clone());
        }
        result
    }

    fn encode(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let used = self.lzma.lz_mut().fill_window(data);
            data = &data[used..];
            self.current_size += used as u64;
            self.lzma.encode_for_lzma1();
            self.lzma.rc_mut().write_to(&mut self.inner)?;
        }
        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.check_usable()?;

        if let Some(expected) = self.expected_size {
            if expected - self.current_size < data.len() as u64 {
                return Err(LzmaError::unsupported(format!(
                    "input exceeds the expected uncompressed size of {expected} bytes"
                )));
            }
        }

        let result = self.encode(data);
        self.record(result)
    }

    fn finish_stream(&mut self) -> Result<()> {
        if let Some(expected) = self.expected_size {
            if expected != self.current_size {
                return Err(LzmaError::unsupported(format!(
                    "expected {expected} uncompressed bytes but got {}",
                    self.current_size
                )));
            }
        }

        self.lzma.lz_mut().set_finishing();
        self.lzma.encode_for_lzma1();
        if self.end_marker {
            self.lzma.encode_lzma1_end_marker();
            trace!(uncompressed_size = self.current_size, "wrote LZMA end marker");
        }
        self.lzma.rc_mut().finish();
        self.lzma.rc_mut().write_to(&mut self.inner)?;
        Ok(())
    }

    /// Terminate the stream and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.try_finish()?;
        Ok(self.inner)
    }
}

impl<W: Write> FinishableWrite for LzmaWriter<W> {
    fn try_finish(&mut self) -> Result<()> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.finished {
            return Ok(());
        }

        let result = self.finish_stream();
        self.record(result)?;
        self.finished = true;
        debug!(uncompressed_size = self.current_size, "finished LZMA stream");
        Ok(())
    }
}

impl<W: Write> MemoryUsage for LzmaWriter<W> {
    fn memory_usage_kib(&self) -> u64 {
        self.memory_kib
    }
}

impl<W: Write> Write for LzmaWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_usable()?;
        Err(LzmaError::unsupported("raw LZMA streams cannot be flushed").into())
    }
}

/// Streaming raw LZMA1 decompressor.
///
/// With an unknown size the stream must end in an end marker. With a known
/// size decoding stops after that many bytes; an end marker after them is
/// not accepted. The first error is remembered and returned by every later
/// call.
#[derive(Debug)]
pub struct LzmaReader<R: Read> {
    rc: RangeDecoder<StreamSource<R>>,
    lz: LzDecoder,
    lzma: LzmaDecoder,
    /// Bytes left to decode, when the size is known.
    remaining: Option<u64>,
    end_reached: bool,
    error: Option<LzmaError>,
    memory_kib: u64,
}

impl<R: Read> LzmaReader<R> {
    /// Create a reader. Reads the first five bytes of the stream.
    pub fn new(
        inner: R,
        props: LzmaProperties,
        dict_size: u32,
        uncompressed_size: Option<u64>,
    ) -> Result<Self> {
        Self::create(inner, props, dict_size, uncompressed_size, None, None)
    }

    /// Create a reader for a stream compressed with a preset dictionary.
    pub fn with_preset_dict(
        inner: R,
        props: LzmaProperties,
        dict_size: u32,
        uncompressed_size: Option<u64>,
        preset_dict: &[u8],
    ) -> Result<Self> {
        Self::create(inner, props, dict_size, uncompressed_size, Some(preset_dict), None)
    }

    /// Create a reader, failing with `MemoryLimitExceeded` before reading
    /// or allocating anything if it would need more than `limit_kib`.
    pub fn with_memory_limit(
        inner: R,
        props: LzmaProperties,
        dict_size: u32,
        uncompressed_size: Option<u64>,
        limit_kib: u64,
    ) -> Result<Self> {
        Self::create(inner, props, dict_size, uncompressed_size, None, Some(limit_kib))
    }

    fn create(
        inner: R,
        props: LzmaProperties,
        dict_size: u32,
        uncompressed_size: Option<u64>,
        preset_dict: Option<&[u8]>,
        limit_kib: Option<u64>,
    ) -> Result<Self> {
        if props.lc > LC_MAX || props.lp > LP_MAX || props.pb > PB_MAX {
            return Err(LzmaError::unsupported(format!(
                "LZMA properties out of range (lc = {}, lp = {}, pb = {})",
                props.lc, props.lp, props.pb
            )));
        }
        if dict_size > READER_DICT_SIZE_MAX {
            return Err(LzmaError::unsupported(format!(
                "LZMA dictionary size {dict_size} exceeds {READER_DICT_SIZE_MAX}"
            )));
        }

        let memory_kib = lzma_decoder_memory_usage(dict_size, props.lc, props.lp);
        check_memory_limit(memory_kib, limit_kib)?;

        let mut dict = lzma_reader_dict_size(dict_size);
        if let Some(size) = uncompressed_size {
            if (dict as u64) > size {
                dict = lzma_reader_dict_size(size as u32);
            }
        }

        let preset_dict = preset_dict.filter(|d| !d.is_empty());
        let lz = LzDecoder::new(dict as usize, preset_dict);
        let rc = RangeDecoder::from_stream(inner)?;

        debug!(
            dict_size = dict,
            ?uncompressed_size,
            preset_dict = preset_dict.is_some(),
            "created LZMA reader"
        );

        Ok(Self {
            rc,
            lz,
            lzma: LzmaDecoder::new(props),
            remaining: uncompressed_size,
            end_reached: false,
            error: None,
            memory_kib,
        })
    }

    /// Consume the reader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.rc.into_inner()
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut size = 0;
        while size < buf.len() {
            let mut copy_max = buf.len() - size;
            if let Some(remaining) = self.remaining {
                copy_max = copy_max.min(usize::try_from(remaining).unwrap_or(usize::MAX));
            }
            self.lz.set_limit(copy_max);

            if let Err(err) = self.lzma.decode(&mut self.lz, &mut self.rc) {
                if self.remaining.is_some() || !self.lzma.end_marker_detected() {
                    return Err(err);
                }
                trace!("LZMA end marker reached");
                self.end_reached = true;
                self.rc.normalize()?;
            }

            let copied = self.lz.flush(&mut buf[size..]);
            size += copied;

            if let Some(remaining) = &mut self.remaining {
                *remaining -= copied as u64;
                if *remaining == 0 {
                    self.end_reached = true;
                }
            }

            if self.end_reached {
                if !self.rc.is_finished() || self.lz.has_pending() {
                    return Err(LzmaError::corrupted(
                        "LZMA stream continues past its end",
                    ));
                }
                return Ok(size);
            }
        }

        Ok(size)
    }
}

impl<R: Read> MemoryUsage for LzmaReader<R> {
    fn memory_usage_kib(&self) -> u64 {
        self.memory_kib
    }
}

impl<R: Read> Read for LzmaReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(err) = &self.error {
            return Err(err.clone().into());
        }
        if self.end_reached {
            return Ok(0);
        }

        match self.read_data(buf) {
            Ok(n) => Ok(n),
            Err(err) => {
                self.error = Some(err.clone());
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn options() -> LzmaOptions {
        LzmaOptions::new().dict_size(1 << 16)
    }

    fn sample() -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..2000u32 {
            data.extend_from_slice(format!("line {} of the sample text\n", i % 97).as_bytes());
        }
        data
    }

    fn read_all<R: Read>(mut reader: R) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).map_err(LzmaError::from_io)?;
        Ok(out)
    }

    #[test]
    fn test_end_marker_roundtrip() {
        let data = sample();
        let mut writer = LzmaWriter::new(Vec::new(), &options(), true, None).unwrap();
        writer.write_all(&data).unwrap();
        let props = writer.props();
        let compressed = writer.finish().unwrap();
        assert!(compressed.len() < data.len() / 4);

        let reader = LzmaReader::new(Cursor::new(&compressed), props, 1 << 16, None).unwrap();
        assert_eq!(read_all(reader).unwrap(), data);
    }

    #[test]
    fn test_known_size_roundtrip() {
        let data = sample();
        let size = data.len() as u64;
        let mut writer = LzmaWriter::new(Vec::new(), &options(), false, Some(size)).unwrap();
        writer.write_all(&data).unwrap();
        let compressed = writer.finish().unwrap();

        let reader =
            LzmaReader::new(Cursor::new(&compressed), LzmaProperties::default(), 1 << 16, Some(size))
                .unwrap();
        assert_eq!(read_all(reader).unwrap(), data);
    }

    #[test]
    fn test_empty_with_end_marker() {
        let writer = LzmaWriter::new(Vec::new(), &options(), true, None).unwrap();
        let compressed = writer.finish().unwrap();
        let reader =
            LzmaReader::new(Cursor::new(&compressed), LzmaProperties::default(), 1 << 16, None)
                .unwrap();
        assert!(read_all(reader).unwrap().is_empty());
    }

    #[test]
    fn test_expected_size_enforced() {
        let mut writer = LzmaWriter::new(Vec::new(), &options(), false, Some(4)).unwrap();
        assert!(writer.write_all(b"too long").is_err());
        // Sticky: even a fitting write now fails.
        assert!(writer.write_all(b"ok").is_err());

        let mut writer = LzmaWriter::new(Vec::new(), &options(), false, Some(4)).unwrap();
        writer.write_all(b"abc").unwrap();
        assert!(matches!(
            writer.try_finish().unwrap_err(),
            LzmaError::UnsupportedConfig { .. }
        ));
    }

    #[test]
    fn test_flush_unsupported() {
        let mut writer = LzmaWriter::new(Vec::new(), &options(), true, None).unwrap();
        writer.write_all(b"data").unwrap();
        let err = LzmaError::from_io(writer.flush().unwrap_err());
        assert!(matches!(err, LzmaError::UnsupportedConfig { .. }));
    }

    #[test]
    fn test_rejects_uncompressed_mode() {
        let options = options().mode(Mode::Uncompressed);
        assert!(LzmaWriter::new(Vec::new(), &options, true, None).is_err());
    }

    #[test]
    fn test_reader_rejects_bad_props() {
        let stream = [0u8; 5];
        let err = LzmaReader::new(Cursor::new(&stream), LzmaProperties::new(9, 0, 0), 4096, None)
            .unwrap_err();
        assert!(matches!(err, LzmaError::UnsupportedConfig { .. }));

        // lc + lp above 4 is fine for raw LZMA.
        assert!(
            LzmaReader::new(Cursor::new(&stream), LzmaProperties::new(8, 4, 4), 4096, None).is_ok()
        );
    }

    #[test]
    fn test_reader_rejects_bad_first_byte() {
        let stream = [1u8, 0, 0, 0, 0];
        let err = LzmaReader::new(Cursor::new(&stream), LzmaProperties::default(), 4096, None)
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_reader_truncated() {
        let data = sample();
        let mut writer = LzmaWriter::new(Vec::new(), &options(), true, None).unwrap();
        writer.write_all(&data).unwrap();
        let compressed = writer.finish().unwrap();

        let cut = &compressed[..compressed.len() / 2];
        let reader =
            LzmaReader::new(Cursor::new(cut), LzmaProperties::default(), 1 << 16, None).unwrap();
        assert!(read_all(reader).unwrap_err().is_truncated());
    }

    #[test]
    fn test_known_size_rejects_trailing_end_marker() {
        let data = sample();
        let mut writer = LzmaWriter::new(Vec::new(), &options(), true, None).unwrap();
        writer.write_all(&data).unwrap();
        let compressed = writer.finish().unwrap();

        let reader = LzmaReader::new(
            Cursor::new(&compressed),
            LzmaProperties::default(),
            1 << 16,
            Some(data.len() as u64),
        )
        .unwrap();
        assert!(read_all(reader).unwrap_err().is_corruption());
    }

    #[test]
    fn test_reader_memory_limit() {
        let err = LzmaReader::with_memory_limit(
            Cursor::new(&[][..]),
            LzmaProperties::default(),
            1 << 20,
            None,
            100,
        )
        .unwrap_err();
        assert!(matches!(err, LzmaError::MemoryLimitExceeded { limit_kib: 100, .. }));
    }
}
