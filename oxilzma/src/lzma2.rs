//! LZMA2 chunk framing.
//!
//! An LZMA2 stream is a sequence of chunks, each introduced by a control
//! byte, and terminated by a single `0x00`:
//!
//! - `0x01` / `0x02`: up to 64 KiB stored as is, with or without a
//!   dictionary reset;
//! - `0x80..=0xFF`: an LZMA chunk of up to 2 MiB uncompressed and 64 KiB
//!   compressed. Bits 5-6 select how much is reset (nothing, state, state
//!   and properties, or everything including the dictionary); bits 0-4
//!   hold the top of the uncompressed size.
//!
//! [`Lzma2Writer`] closes a chunk whenever either size limit is near and
//! stores it uncompressed when compression did not pay off. [`Lzma2Reader`]
//! validates every header against the reset rules.

use crate::decoder::LzmaDecoder;
use crate::encoder::{EncoderConfig, LzmaEncoder, dist_slot};
use crate::lz::LzDecoder;
use crate::model::LzmaProperties;
use crate::options::{
    DICT_SIZE_MIN, LzmaOptions, Mode, check_memory_limit, lzma2_decoder_memory_usage,
    lzma2_extra_before, lzma2_reader_dict_size,
};
use crate::range_coder::{ChunkBuffer, RangeDecoder};
use oxilzma_core::error::{LzmaError, Result};
use oxilzma_core::traits::{FinishableWrite, MemoryUsage};
use std::io::{self, Read, Write};
use tracing::{debug, trace};

/// Largest compressed size of a chunk, and largest uncompressed chunk (64 KiB).
pub const COMPRESSED_SIZE_MAX: usize = 1 << 16;

/// Largest uncompressed size of an LZMA chunk (2 MiB).
pub const UNCOMPRESSED_SIZE_MAX: usize = 1 << 21;

/// Largest dictionary size an LZMA2 reader accepts.
pub const READER_DICT_SIZE_MAX: u32 = i32::MAX as u32 & !15;

/// Largest LZMA2 dictionary property.
const DICT_PROPS_MAX: u8 = 40;

/// Control byte constants and utilities for LZMA2.
pub mod control {
    /// End of stream marker.
    pub const EOS: u8 = 0x00;

    /// Uncompressed chunk with dictionary reset.
    pub const UNCOMPRESSED_RESET: u8 = 0x01;

    /// Uncompressed chunk without reset.
    pub const UNCOMPRESSED: u8 = 0x02;

    /// LZMA chunk, nothing reset.
    pub const LZMA: u8 = 0x80;

    /// LZMA chunk with state reset.
    pub const LZMA_STATE_RESET: u8 = 0xA0;

    /// LZMA chunk with state reset and new properties.
    pub const LZMA_PROPS_RESET: u8 = 0xC0;

    /// LZMA chunk with dictionary reset, state reset and new properties.
    pub const LZMA_DICT_RESET: u8 = 0xE0;

    /// High bits of uncompressed size mask (bits 0-4).
    pub const SIZE_HIGH_MASK: u8 = 0x1F;

    /// Check if control byte indicates LZMA chunk.
    #[inline]
    pub const fn is_lzma(ctrl: u8) -> bool {
        ctrl >= LZMA
    }

    /// Check if control byte resets the dictionary.
    #[inline]
    pub const fn resets_dict(ctrl: u8) -> bool {
        ctrl >= LZMA_DICT_RESET || ctrl == UNCOMPRESSED_RESET
    }

    /// Check if an LZMA control byte carries a properties byte.
    #[inline]
    pub const fn has_props(ctrl: u8) -> bool {
        ctrl >= LZMA_PROPS_RESET
    }

    /// Check if an LZMA control byte resets the state.
    #[inline]
    pub const fn resets_state(ctrl: u8) -> bool {
        ctrl >= LZMA_STATE_RESET
    }

    /// Build an LZMA control byte from its reset kind and the chunk's
    /// uncompressed size.
    #[inline]
    pub const fn build_lzma(reset: u8, uncompressed_size: usize) -> u8 {
        reset | (((uncompressed_size - 1) >> 16) as u8 & SIZE_HIGH_MASK)
    }
}

/// Dictionary size encoded by an LZMA2 dictionary property byte.
pub fn dict_size_from_props(props: u8) -> Result<u32> {
    if props > DICT_PROPS_MAX {
        return Err(LzmaError::corrupted(format!(
            "invalid LZMA2 dictionary property {props}"
        )));
    }
    if props == DICT_PROPS_MAX {
        return Ok(u32::MAX);
    }
    Ok((2 | (props as u32 & 1)) << (props / 2 + 11))
}

/// Smallest LZMA2 dictionary property whose size holds `dict_size`.
pub fn props_from_dict_size(dict_size: u32) -> u8 {
    (dist_slot(dict_size.max(DICT_SIZE_MIN) - 1) - 23) as u8
}

/// What the next chunk has to reset. Later variants imply the earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ChunkState {
    Ready,
    NeedStateReset,
    NeedProps,
    NeedDictReset,
}

impl ChunkState {
    /// Reset bits of the next LZMA chunk.
    fn lzma_control(self) -> u8 {
        match self {
            ChunkState::Ready => control::LZMA,
            ChunkState::NeedStateReset => control::LZMA_STATE_RESET,
            ChunkState::NeedProps => control::LZMA_PROPS_RESET,
            ChunkState::NeedDictReset => control::LZMA_DICT_RESET,
        }
    }

    /// Control byte of the next uncompressed chunk.
    fn uncompressed_control(self) -> u8 {
        if self == ChunkState::NeedDictReset {
            control::UNCOMPRESSED_RESET
        } else {
            control::UNCOMPRESSED
        }
    }

    /// State after an uncompressed chunk: the dictionary is reset, but the
    /// encoder state no longer matches the decoder's.
    fn after_uncompressed(self) -> Self {
        let state = if self == ChunkState::NeedDictReset {
            ChunkState::NeedProps
        } else {
            self
        };
        state.max(ChunkState::NeedStateReset)
    }
}

/// Write an uncompressed chunk header for `len` bytes.
fn write_uncompressed_header<W: Write>(out: &mut W, state: ChunkState, len: usize) -> io::Result<()> {
    let size = (len - 1) as u16;
    let [hi, lo] = size.to_be_bytes();
    out.write_all(&[state.uncompressed_control(), hi, lo])
}

/// LZMA2 encoding of compressible data.
#[derive(Debug)]
struct LzmaChunker {
    lzma: Box<LzmaEncoder>,
    props: u8,
    /// Bytes given to the window but not yet written out in a chunk.
    pending_size: usize,
}

impl LzmaChunker {
    fn write<W: Write>(&mut self, out: &mut W, state: &mut ChunkState, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let used = self.lzma.lz_mut().fill_window(data);
            data = &data[used..];
            self.pending_size += used;

            if self.lzma.encode_for_lzma2() {
                self.write_chunk(out, state)?;
            }
        }
        Ok(())
    }

    /// Encode and write out everything given so far.
    fn drain<W: Write>(&mut self, out: &mut W, state: &mut ChunkState) -> Result<()> {
        while self.pending_size > 0 {
            self.lzma.encode_for_lzma2();
            self.write_chunk(out, state)?;
        }
        Ok(())
    }

    fn write_chunk<W: Write>(&mut self, out: &mut W, state: &mut ChunkState) -> Result<()> {
        let compressed_size = self.lzma.rc_mut().finish();
        let mut uncompressed_size = self.lzma.uncompressed_size();
        debug_assert!(compressed_size > 0);
        debug_assert!(uncompressed_size > 0);

        if compressed_size + 2 < uncompressed_size {
            self.write_lzma(out, state, uncompressed_size, compressed_size)?;
        } else {
            self.lzma.reset();
            uncompressed_size = self.lzma.uncompressed_size();
            debug!(
                uncompressed_size,
                compressed_size, "chunk did not compress, storing it uncompressed"
            );
            self.write_uncompressed(out, state, uncompressed_size)?;
        }

        self.pending_size -= uncompressed_size;
        self.lzma.reset_uncompressed_size();
        self.lzma.rc_mut().reset();
        Ok(())
    }

    fn write_lzma<W: Write>(
        &mut self,
        out: &mut W,
        state: &mut ChunkState,
        uncompressed_size: usize,
        compressed_size: usize,
    ) -> Result<()> {
        let ctrl = control::build_lzma(state.lzma_control(), uncompressed_size);
        let [_, _, u_hi, u_lo] = ((uncompressed_size - 1) as u32).to_be_bytes();
        let [c_hi, c_lo] = ((compressed_size - 1) as u16).to_be_bytes();

        if *state >= ChunkState::NeedProps {
            out.write_all(&[ctrl, u_hi, u_lo, c_hi, c_lo, self.props])?;
        } else {
            out.write_all(&[ctrl, u_hi, u_lo, c_hi, c_lo])?;
        }
        self.lzma.rc_mut().write_to(out)?;

        trace!(
            control = ctrl,
            uncompressed_size, compressed_size, "wrote LZMA chunk"
        );
        *state = ChunkState::Ready;
        Ok(())
    }

    fn write_uncompressed<W: Write>(
        &mut self,
        out: &mut W,
        state: &mut ChunkState,
        uncompressed_size: usize,
    ) -> Result<()> {
        let mut remaining = uncompressed_size;
        while remaining > 0 {
            let len = remaining.min(COMPRESSED_SIZE_MAX);
            write_uncompressed_header(out, *state, len)?;
            self.lzma.lz().copy_uncompressed(out, remaining, len)?;
            remaining -= len;
            *state = state.after_uncompressed();
            trace!(len, "wrote uncompressed chunk");
        }
        Ok(())
    }
}

/// LZMA2 framing without compression.
#[derive(Debug)]
struct UncompressedChunker {
    buf: Vec<u8>,
}

impl UncompressedChunker {
    fn write<W: Write>(&mut self, out: &mut W, state: &mut ChunkState, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = data.len().min(COMPRESSED_SIZE_MAX - self.buf.len());
            self.buf.extend_from_slice(&data[..n]);
            data = &data[n..];

            if self.buf.len() == COMPRESSED_SIZE_MAX {
                self.drain(out, state)?;
            }
        }
        Ok(())
    }

    fn drain<W: Write>(&mut self, out: &mut W, state: &mut ChunkState) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        write_uncompressed_header(out, *state, self.buf.len())?;
        out.write_all(&self.buf)?;
        trace!(len = self.buf.len(), "wrote uncompressed chunk");
        self.buf.clear();
        *state = state.after_uncompressed();
        Ok(())
    }
}

#[derive(Debug)]
enum Chunker {
    Lzma(LzmaChunker),
    Uncompressed(UncompressedChunker),
}

impl Chunker {
    fn write<W: Write>(&mut self, out: &mut W, state: &mut ChunkState, data: &[u8]) -> Result<()> {
        match self {
            Chunker::Lzma(c) => c.write(out, state, data),
            Chunker::Uncompressed(c) => c.write(out, state, data),
        }
    }

    /// Turn everything buffered into chunks; with `finishing`, no more
    /// input will follow.
    fn drain<W: Write>(&mut self, out: &mut W, state: &mut ChunkState, finishing: bool) -> Result<()> {
        match self {
            Chunker::Lzma(c) => {
                if finishing {
                    c.lzma.lz_mut().set_finishing();
                } else {
                    c.lzma.lz_mut().set_flushing();
                }
                c.drain(out, state)
            }
            Chunker::Uncompressed(c) => c.drain(out, state),
        }
    }
}

/// Streaming LZMA2 compressor.
///
/// Every [`flush`](Write::flush) ends the current chunk so that a reader
/// can decode everything written so far; the stream stays usable. The
/// stream must be terminated with [`finish`](Self::finish) or
/// [`try_finish`](FinishableWrite::try_finish). The first error is
/// remembered and returned by every later call.
#[derive(Debug)]
pub struct Lzma2Writer<W: Write> {
    inner: W,
    chunker: Chunker,
    state: ChunkState,
    error: Option<LzmaError>,
    finished: bool,
    memory_kib: u64,
}

impl<W: Write> Lzma2Writer<W> {
    /// Create a writer compressing into `inner`.
    pub fn new(inner: W, options: &LzmaOptions) -> Result<Self> {
        Self::create(inner, options, None)
    }

    /// Create a writer, failing with `MemoryLimitExceeded` before any
    /// allocation if it would need more than `limit_kib`.
    pub fn with_memory_limit(inner: W, options: &LzmaOptions, limit_kib: u64) -> Result<Self> {
        Self::create(inner, options, Some(limit_kib))
    }

    fn create(inner: W, options: &LzmaOptions, limit_kib: Option<u64>) -> Result<Self> {
        options.validate()?;
        let memory_kib = options.encoder_memory_usage();
        check_memory_limit(memory_kib, limit_kib)?;

        let preset = options.preset_dict.as_deref().filter(|d| !d.is_empty());

        let (chunker, state) = if options.mode == Mode::Uncompressed {
            let chunker = Chunker::Uncompressed(UncompressedChunker {
                buf: Vec::with_capacity(COMPRESSED_SIZE_MAX),
            });
            (chunker, ChunkState::NeedDictReset)
        } else {
            let config = EncoderConfig {
                mode: options.mode,
                dict_size: options.dict_size,
                extra_before: lzma2_extra_before(options.dict_size),
                nice_len: options.nice_len,
                match_finder: options.match_finder,
                depth_limit: options.depth_limit,
            };
            let mut lzma = Box::new(LzmaEncoder::new(options.props(), &config));

            let state = match preset {
                Some(dict) => {
                    lzma.lz_mut().set_preset_dict(options.dict_size, dict);
                    ChunkState::NeedProps
                }
                None => ChunkState::NeedDictReset,
            };

            let chunker = Chunker::Lzma(LzmaChunker {
                lzma,
                props: options.props().to_byte(),
                pending_size: 0,
            });
            (chunker, state)
        };

        debug!(
            mode = ?options.mode,
            dict_size = options.dict_size,
            memory_kib,
            preset_dict = preset.is_some(),
            "created LZMA2 writer"
        );

        Ok(Self {
            inner,
            chunker,
            state,
            error: None,
            finished: false,
            memory_kib,
        })
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

    /// Remember the first error.
    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.error = Some(err.clone());
        }
        result
    }

    fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.check_usable()?;
        let result = self.chunker.write(&mut self.inner, &mut self.state, data);
        self.record(result)
    }

    fn flush_data(&mut self) -> Result<()> {
        self.check_usable()?;
        let result = self
            .chunker
            .drain(&mut self.inner, &mut self.state, false)
            .and_then(|()| Ok(self.inner.flush()?));
        self.record(result)
    }

    /// Terminate the stream and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.try_finish()?;
        Ok(self.inner)
    }
}

impl<W: Write> FinishableWrite for Lzma2Writer<W> {
    fn try_finish(&mut self) -> Result<()> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.finished {
            return Ok(());
        }

        let result = self
            .chunker
            .drain(&mut self.inner, &mut self.state, true)
            .and_then(|()| Ok(self.inner.write_all(&[control::EOS])?));
        self.record(result)?;

        self.finished = true;
        debug!("finished LZMA2 stream");
        Ok(())
    }
}

impl<W: Write> MemoryUsage for Lzma2Writer<W> {
    fn memory_usage_kib(&self) -> u64 {
        self.memory_kib
    }
}

impl<W: Write> Write for Lzma2Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_data()?)
    }
}

/// Streaming LZMA2 decompressor.
///
/// The first error is remembered and returned by every later call.
#[derive(Debug)]
pub struct Lzma2Reader<R: Read> {
    inner: R,
    lz: LzDecoder,
    rc: RangeDecoder<ChunkBuffer>,
    lzma: Option<LzmaDecoder>,
    state: ChunkState,
    /// Uncompressed bytes left in the current chunk.
    chunk_remaining: usize,
    is_lzma_chunk: bool,
    end_reached: bool,
    error: Option<LzmaError>,
    memory_kib: u64,
}

impl<R: Read> Lzma2Reader<R> {
    /// Create a reader for a stream compressed with `dict_size`.
    pub fn new(inner: R, dict_size: u32) -> Result<Self> {
        Self::create(inner, dict_size, None, None)
    }

    /// Create a reader for a stream compressed with a preset dictionary.
    pub fn with_preset_dict(inner: R, dict_size: u32, preset_dict: &[u8]) -> Result<Self> {
        Self::create(inner, dict_size, Some(preset_dict), None)
    }

    /// Create a reader, failing with `MemoryLimitExceeded` before any
    /// allocation if it would need more than `limit_kib`.
    pub fn with_memory_limit(inner: R, dict_size: u32, limit_kib: u64) -> Result<Self> {
        Self::create(inner, dict_size, None, Some(limit_kib))
    }

    fn create(
        inner: R,
        dict_size: u32,
        preset_dict: Option<&[u8]>,
        limit_kib: Option<u64>,
    ) -> Result<Self> {
        if !(DICT_SIZE_MIN..=READER_DICT_SIZE_MAX).contains(&dict_size) {
            return Err(LzmaError::unsupported(format!(
                "LZMA2 dictionary size {dict_size} is outside {DICT_SIZE_MIN}..={READER_DICT_SIZE_MAX}"
            )));
        }

        let memory_kib = lzma2_decoder_memory_usage(dict_size);
        check_memory_limit(memory_kib, limit_kib)?;

        let preset_dict = preset_dict.filter(|d| !d.is_empty());
        let state = if preset_dict.is_some() {
            ChunkState::NeedProps
        } else {
            ChunkState::NeedDictReset
        };

        Ok(Self {
            inner,
            lz: LzDecoder::new(lzma2_reader_dict_size(dict_size) as usize, preset_dict),
            rc: RangeDecoder::new_chunked(COMPRESSED_SIZE_MAX),
            lzma: None,
            state,
            chunk_remaining: 0,
            is_lzma_chunk: false,
            end_reached: false,
            error: None,
            memory_kib,
        })
    }

    /// The underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consume the reader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.inner.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_be16(&mut self) -> Result<usize> {
        let mut b = [0u8; 2];
        self.inner.read_exact(&mut b)?;
        Ok(u16::from_be_bytes(b) as usize)
    }

    fn decode_chunk_header(&mut self) -> Result<()> {
        let ctrl = self.read_u8()?;
        if ctrl == control::EOS {
            self.end_reached = true;
            return Ok(());
        }

        if control::resets_dict(ctrl) {
            self.state = ChunkState::NeedProps;
            self.lz.reset();
            trace!(control = ctrl, "dictionary reset");
        } else if self.state == ChunkState::NeedDictReset {
            return Err(LzmaError::corrupted(format!(
                "chunk with control byte {ctrl:#04x} does not reset the dictionary"
            )));
        }

        if control::is_lzma(ctrl) {
            self.is_lzma_chunk = true;
            let uncompressed_size = ((ctrl & control::SIZE_HIGH_MASK) as usize) << 16;
            self.chunk_remaining = uncompressed_size + self.read_be16()? + 1;
            let compressed_size = self.read_be16()? + 1;

            if control::has_props(ctrl) {
                let byte = self.read_u8()?;
                let props = LzmaProperties::from_byte_lzma2(byte).ok_or_else(|| {
                    LzmaError::corrupted(format!("invalid LZMA2 properties byte {byte:#04x}"))
                })?;
                match &mut self.lzma {
                    Some(lzma) if lzma.props() == props => lzma.reset(),
                    _ => self.lzma = Some(LzmaDecoder::new(props)),
                }
                self.state = ChunkState::Ready;
            } else if self.state >= ChunkState::NeedProps {
                return Err(LzmaError::corrupted(format!(
                    "chunk with control byte {ctrl:#04x} lacks the required properties"
                )));
            } else if control::resets_state(ctrl) {
                if let Some(lzma) = &mut self.lzma {
                    lzma.reset();
                }
            }

            trace!(
                control = ctrl,
                uncompressed_size = self.chunk_remaining,
                compressed_size,
                "LZMA chunk"
            );
            self.rc.prepare_input_buffer(&mut self.inner, compressed_size)?;
        } else if ctrl > control::UNCOMPRESSED {
            return Err(LzmaError::corrupted(format!(
                "invalid LZMA2 control byte {ctrl:#04x}"
            )));
        } else {
            self.is_lzma_chunk = false;
            self.chunk_remaining = self.read_be16()? + 1;
            trace!(len = self.chunk_remaining, "uncompressed chunk");
        }

        Ok(())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut size = 0;
        while size < buf.len() {
            if self.chunk_remaining == 0 {
                self.decode_chunk_header()?;
                if self.end_reached {
                    return Ok(size);
                }
            }

            let copy_max = self.chunk_remaining.min(buf.len() - size);
            self.lz.set_limit(copy_max);

            if self.is_lzma_chunk {
                let lzma = self
                    .lzma
                    .as_mut()
                    .ok_or_else(|| LzmaError::corrupted("LZMA chunk before any properties"))?;
                lzma.decode(&mut self.lz, &mut self.rc)?;
            } else {
                self.lz.copy_uncompressed(&mut self.inner, copy_max)?;
            }

            let copied = self.lz.flush(&mut buf[size..]);
            size += copied;
            self.chunk_remaining -= copied;

            if self.chunk_remaining == 0 && (!self.rc.is_finished() || self.lz.has_pending()) {
                return Err(LzmaError::corrupted(
                    "LZMA chunk size does not match its compressed data",
                ));
            }
        }

        Ok(size)
    }
}

impl<R: Read> MemoryUsage for Lzma2Reader<R> {
    fn memory_usage_kib(&self) -> u64 {
        self.memory_kib
    }
}

impl<R: Read> Read for Lzma2Reader<R> {
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
