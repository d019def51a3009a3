//! Range coder for LZMA compression.
//!
//! The range coder is an entropy coding method similar to arithmetic coding.
//! LZMA uses a specific variant with:
//! - 32-bit range tracking
//! - Normalization when range drops below 2^24
//! - 11-bit adaptive probability model (1024 = 50%)
//!
//! Prices used by the encoder's parsers are measured in 1/16 bit units and
//! come from a table computed at compile time.

use oxilzma_core::error::{LzmaError, Result};
use std::io::{self, Read, Write};

/// Number of bits in probability model.
pub const PROB_BITS: u32 = 11;

/// Total of the probability model; a probability is `p / PROB_MAX`.
pub const PROB_MAX: u16 = 1 << PROB_BITS;

/// Initial probability (50%).
pub const PROB_INIT: u16 = PROB_MAX / 2;

/// Number of bits to shift for probability update.
pub const MOVE_BITS: u32 = 5;

/// Top value for range normalization.
const TOP_VALUE: u32 = 1 << 24;

/// Bits of a byte shifted in or out on normalization.
const SHIFT_BITS: u32 = 8;

/// Probabilities are reduced by this many bits before indexing the price table.
const MOVE_REDUCING_BITS: u32 = 4;

/// Prices carry this many fractional bits.
const BIT_PRICE_SHIFT_BITS: u32 = 4;

const PRICE_TABLE_SIZE: usize = (PROB_MAX as usize) >> MOVE_REDUCING_BITS;

/// Price of coding a bit with a given probability, indexed by `prob >> 4`.
static PRICES: [u32; PRICE_TABLE_SIZE] = build_price_table();

const fn build_price_table() -> [u32; PRICE_TABLE_SIZE] {
    let mut prices = [0u32; PRICE_TABLE_SIZE];
    let mut i = (1u32 << MOVE_REDUCING_BITS) / 2;
    while i < PROB_MAX as u32 {
        let mut w = i;
        let mut bit_count = 0u32;
        let mut j = 0;
        while j < BIT_PRICE_SHIFT_BITS {
            w *= w;
            bit_count <<= 1;
            while w & 0xFFFF_0000 != 0 {
                w >>= 1;
                bit_count += 1;
            }
            j += 1;
        }
        prices[(i >> MOVE_REDUCING_BITS) as usize] =
            (PROB_BITS << BIT_PRICE_SHIFT_BITS) - 15 - bit_count;
        i += 1 << MOVE_REDUCING_BITS;
    }
    prices
}

/// Price of encoding `bit` with probability `prob`.
#[inline(always)]
pub fn bit_price(prob: u16, bit: u32) -> u32 {
    let index = (prob as u32 ^ (0u32.wrapping_sub(bit) & (PROB_MAX as u32 - 1))) >> MOVE_REDUCING_BITS;
    PRICES[index as usize]
}

/// Price of encoding `symbol` MSB-first through a bit tree.
pub fn bit_tree_price(probs: &[u16], symbol: u32) -> u32 {
    let mut price = 0;
    let mut symbol = symbol | probs.len() as u32;
    loop {
        let bit = symbol & 1;
        symbol >>= 1;
        price += bit_price(probs[symbol as usize], bit);
        if symbol == 1 {
            return price;
        }
    }
}

/// Price of encoding `symbol` LSB-first through a bit tree.
pub fn reverse_bit_tree_price(probs: &[u16], symbol: u32) -> u32 {
    let mut price = 0;
    let mut index = 1usize;
    let mut symbol = symbol | probs.len() as u32;
    loop {
        let bit = symbol & 1;
        symbol >>= 1;
        price += bit_price(probs[index], bit);
        index = (index << 1) | bit as usize;
        if symbol == 1 {
            return price;
        }
    }
}

/// Price of `count` bits with fixed 50% probability.
#[inline]
pub fn direct_bits_price(count: u32) -> u32 {
    count << BIT_PRICE_SHIFT_BITS
}

/// Where a [`RangeDecoder`] pulls its compressed bytes from.
pub trait ByteSource {
    /// Next compressed byte.
    fn next_byte(&mut self) -> Result<u8>;

    /// Whether every available byte has been consumed.
    fn at_end(&self) -> bool {
        true
    }
}

/// Compressed payload of a single LZMA2 chunk, read ahead in full.
#[derive(Debug)]
pub struct ChunkBuffer {
    buf: Vec<u8>,
    pos: usize,
}

impl ChunkBuffer {
    /// Create an empty buffer able to hold `capacity` payload bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            pos: 0,
        }
    }
}

impl ByteSource for ChunkBuffer {
    #[inline]
    fn next_byte(&mut self) -> Result<u8> {
        match self.buf.get(self.pos) {
            Some(&b) => {
                self.pos += 1;
                Ok(b)
            }
            None => Err(LzmaError::corrupted(
                "range decoder read past the end of the chunk",
            )),
        }
    }

    fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }
}

/// Unbounded compressed stream, as used by raw LZMA1.
#[derive(Debug)]
pub struct StreamSource<R: Read> {
    reader: R,
}

impl<R: Read> ByteSource for StreamSource<R> {
    #[inline]
    fn next_byte(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.reader.read_exact(&mut b).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                LzmaError::truncated("LZMA stream ended before the end of the data")
            } else {
                LzmaError::from(e)
            }
        })?;
        Ok(b[0])
    }
}

/// Range decoder for LZMA decompression.
#[derive(Debug)]
pub struct RangeDecoder<S: ByteSource> {
    source: S,
    range: u32,
    code: u32,
}

impl RangeDecoder<ChunkBuffer> {
    /// Create a decoder for LZMA2 chunks holding up to `capacity` bytes each.
    pub fn new_chunked(capacity: usize) -> Self {
        Self {
            source: ChunkBuffer::new(capacity),
            range: 0,
            code: 0,
        }
    }

    /// Read the `len` compressed bytes of the next chunk and initialize the
    /// decoder from their first five bytes.
    pub fn prepare_input_buffer<R: Read>(&mut self, reader: &mut R, len: usize) -> Result<()> {
        if len < 5 {
            return Err(LzmaError::corrupted(format!(
                "LZMA chunk of {len} compressed bytes is too short"
            )));
        }
        let mut head = [0u8; 5];
        reader.read_exact(&mut head)?;
        if head[0] != 0x00 {
            return Err(LzmaError::corrupted("LZMA chunk does not start with 0x00"));
        }
        self.code = u32::from_be_bytes([head[1], head[2], head[3], head[4]]);
        self.range = 0xFFFF_FFFF;

        let buf = &mut self.source.buf;
        buf.clear();
        buf.resize(len - 5, 0);
        reader.read_exact(buf)?;
        self.source.pos = 0;
        Ok(())
    }
}

impl<R: Read> RangeDecoder<StreamSource<R>> {
    /// Create a decoder reading a raw LZMA1 stream.
    pub fn from_stream(reader: R) -> Result<Self> {
        let mut source = StreamSource { reader };
        if source.next_byte()? != 0x00 {
            return Err(LzmaError::corrupted("LZMA stream does not start with 0x00"));
        }
        let mut code = 0u32;
        for _ in 0..4 {
            code = (code << SHIFT_BITS) | source.next_byte()? as u32;
        }
        Ok(Self {
            source,
            range: 0xFFFF_FFFF,
            code,
        })
    }

    /// Return the underlying reader.
    pub fn into_inner(self) -> R {
        self.source.reader
    }
}

impl<S: ByteSource> RangeDecoder<S> {
    /// Normalize the range (refill when range gets small).
    #[inline]
    pub fn normalize(&mut self) -> Result<()> {
        if self.range < TOP_VALUE {
            self.code = (self.code << SHIFT_BITS) | self.source.next_byte()? as u32;
            self.range <<= SHIFT_BITS;
        }
        Ok(())
    }

    /// Whether the compressed data ended exactly where it should.
    pub fn is_finished(&self) -> bool {
        self.source.at_end() && self.code == 0
    }

    /// Decode a single bit with the given probability.
    #[inline]
    pub fn decode_bit(&mut self, prob: &mut u16) -> Result<u32> {
        self.normalize()?;

        let bound = (self.range >> PROB_BITS) * (*prob as u32);

        if self.code < bound {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
            Ok(0)
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> MOVE_BITS;
            Ok(1)
        }
    }

    /// Decode an MSB-first bit tree; the tree size is `probs.len()`.
    pub fn decode_bit_tree(&mut self, probs: &mut [u16]) -> Result<u32> {
        let len = probs.len() as u32;
        let mut symbol = 1u32;
        while symbol < len {
            symbol = (symbol << 1) | self.decode_bit(&mut probs[symbol as usize])?;
        }
        Ok(symbol - len)
    }

    /// Decode an LSB-first bit tree; the tree size is `probs.len()`.
    pub fn decode_reverse_bit_tree(&mut self, probs: &mut [u16]) -> Result<u32> {
        let len = probs.len() as u32;
        let mut symbol = 1u32;
        let mut result = 0u32;
        let mut i = 0;
        while symbol < len {
            let bit = self.decode_bit(&mut probs[symbol as usize])?;
            symbol = (symbol << 1) | bit;
            result |= bit << i;
            i += 1;
        }
        Ok(result)
    }

    /// Decode `count` bits with fixed 50% probability.
    pub fn decode_direct_bits(&mut self, count: u32) -> Result<u32> {
        let mut result = 0u32;
        for _ in 0..count {
            self.normalize()?;
            self.range >>= 1;
            let t = self.code.wrapping_sub(self.range) >> 31;
            self.code = self.code.wrapping_sub(self.range & t.wrapping_sub(1));
            result = (result << 1) | (1 - t);
        }
        Ok(result)
    }
}

/// Range encoder for LZMA compression.
///
/// Output accumulates in an internal buffer; callers drain it with
/// [`RangeEncoder::write_to`].
#[derive(Debug)]
pub struct RangeEncoder {
    /// Output buffer.
    buffer: Vec<u8>,
    /// Current range.
    range: u32,
    /// Low value; bit 32 is the pending carry.
    low: u64,
    /// Byte held back until the carry is known.
    cache: u8,
    /// Held-back bytes: the cache plus a run of 0xFF.
    cache_size: u64,
}

impl RangeEncoder {
    /// Create a new range encoder with room for `capacity` output bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            range: 0xFFFF_FFFF,
            low: 0,
            cache: 0,
            cache_size: 1,
        }
    }

    /// Reset the registers and discard buffered output.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.range = 0xFFFF_FFFF;
        self.low = 0;
        self.cache = 0;
        self.cache_size = 1;
    }

    /// Upper bound of the bytes `finish` would leave in the buffer.
    pub fn pending_size(&self) -> usize {
        self.buffer.len() + self.cache_size as usize + 5 - 1
    }

    /// Flush the registers; returns the number of buffered bytes.
    pub fn finish(&mut self) -> usize {
        for _ in 0..5 {
            self.shift_low();
        }
        self.buffer.len()
    }

    /// Bytes produced so far and not yet drained.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Write the buffered bytes to `out` and clear the buffer.
    pub fn write_to<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }

    fn shift_low(&mut self) {
        let carry = (self.low >> 32) as u8;
        if carry != 0 || self.low < 0xFF00_0000 {
            let mut byte = self.cache;
            loop {
                self.buffer.push(byte.wrapping_add(carry));
                byte = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }

        self.cache_size += 1;
        self.low = (self.low & 0x00FF_FFFF) << SHIFT_BITS;
    }

    #[inline]
    fn normalize(&mut self) {
        if self.range < TOP_VALUE {
            self.range <<= SHIFT_BITS;
            self.shift_low();
        }
    }

    /// Encode a single bit with the given probability.
    #[inline]
    pub fn encode_bit(&mut self, prob: &mut u16, bit: u32) {
        let bound = (self.range >> PROB_BITS) * (*prob as u32);

        if bit == 0 {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
        } else {
            self.low += bound as u64;
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
        }

        self.normalize();
    }

    /// Encode `symbol` MSB-first through a bit tree of `probs.len()` nodes.
    pub fn encode_bit_tree(&mut self, probs: &mut [u16], symbol: u32) {
        let mut index = 1usize;
        let mut mask = probs.len() as u32;
        loop {
            mask >>= 1;
            let bit = u32::from(symbol & mask != 0);
            self.encode_bit(&mut probs[index], bit);
            index = (index << 1) | bit as usize;
            if mask == 1 {
                break;
            }
        }
    }

    /// Encode `symbol` LSB-first through a bit tree of `probs.len()` nodes.
    pub fn encode_reverse_bit_tree(&mut self, probs: &mut [u16], symbol: u32) {
        let mut index = 1usize;
        let mut symbol = symbol | probs.len() as u32;
        loop {
            let bit = symbol & 1;
            symbol >>= 1;
            self.encode_bit(&mut probs[index], bit);
            index = (index << 1) | bit as usize;
            if symbol == 1 {
                break;
            }
        }
    }

    /// Encode the low `count` bits of `value` with fixed 50% probability.
    pub fn encode_direct_bits(&mut self, value: u32, count: u32) {
        for i in (0..count).rev() {
            self.range >>= 1;
            self.low += (self.range & 0u32.wrapping_sub((value >> i) & 1)) as u64;
            self.normalize();
        }
    }
}
