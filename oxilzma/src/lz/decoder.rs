//! Decoder-side dictionary.
//!
//! A circular buffer of `dict_size` bytes. Decoded bytes are written at
//! `pos` and handed to the caller by [`LzDecoder::flush`]; the bytes stay
//! in the buffer as history for later matches.

use oxilzma_core::error::{LzmaError, Result};
use std::io::Read;

/// Circular dictionary of the LZ decoder.
#[derive(Debug)]
pub struct LzDecoder {
    buf: Vec<u8>,
    /// Start of the bytes not yet flushed.
    start: usize,
    /// Write position.
    pos: usize,
    /// Number of valid history bytes, saturating at the buffer size.
    full: usize,
    /// Decoding stops when `pos` reaches this.
    limit: usize,
    /// Bytes of the last match that did not fit before `limit`.
    pending_len: usize,
    pending_dist: u32,
}

impl LzDecoder {
    /// Create a dictionary of `dict_size` bytes, optionally preloaded with
    /// the tail of `preset_dict`.
    pub fn new(dict_size: usize, preset_dict: Option<&[u8]>) -> Self {
        let mut buf = vec![0u8; dict_size];
        let mut pos = 0;

        if let Some(dict) = preset_dict {
            pos = dict.len().min(dict_size);
            buf[..pos].copy_from_slice(&dict[dict.len() - pos..]);
        }

        Self {
            buf,
            start: pos,
            pos,
            full: pos,
            limit: 0,
            pending_len: 0,
            pending_dist: 0,
        }
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.start = 0;
        self.pos = 0;
        self.full = 0;
        self.limit = 0;
        if let Some(last) = self.buf.last_mut() {
            *last = 0;
        }
    }

    /// Allow decoding at most `out_max` more bytes before the next flush.
    pub fn set_limit(&mut self, out_max: usize) {
        if self.buf.len() - self.pos <= out_max {
            self.limit = self.buf.len();
        } else {
            self.limit = self.pos + out_max;
        }
    }

    /// Whether another byte may be decoded before the limit.
    #[inline]
    pub fn has_space(&self) -> bool {
        self.pos < self.limit
    }

    /// Whether part of a match is still waiting to be copied.
    pub fn has_pending(&self) -> bool {
        self.pending_len > 0
    }

    /// Current write position in the buffer.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Byte at zero-based distance `dist` behind the write position.
    #[inline]
    pub fn get_byte(&self, dist: usize) -> u8 {
        let offset = if dist >= self.pos {
            self.pos + self.buf.len() - dist - 1
        } else {
            self.pos - dist - 1
        };
        self.buf[offset]
    }

    /// Append a literal.
    #[inline]
    pub fn put_byte(&mut self, b: u8) {
        self.buf[self.pos] = b;
        self.pos += 1;
        if self.full < self.pos {
            self.full = self.pos;
        }
    }

    /// Copy `len` bytes from zero-based distance `dist`.
    ///
    /// Bytes beyond the limit are remembered and copied by
    /// [`repeat_pending`](Self::repeat_pending).
    pub fn repeat(&mut self, dist: u32, len: usize) -> Result<()> {
        if dist as usize >= self.full {
            return Err(LzmaError::invalid_distance(dist as u64, self.full as u64));
        }

        let mut left = (self.limit - self.pos).min(len);
        self.pending_len = len - left;
        self.pending_dist = dist;

        let dist = dist as usize;
        let mut back = if dist >= self.pos {
            self.pos + self.buf.len() - dist - 1
        } else {
            self.pos - dist - 1
        };

        // Byte by byte: the source may overlap the bytes being written.
        while left > 0 {
            self.buf[self.pos] = self.buf[back];
            self.pos += 1;
            back += 1;
            if back == self.buf.len() {
                back = 0;
            }
            left -= 1;
        }

        if self.full < self.pos {
            self.full = self.pos;
        }

        Ok(())
    }

    /// Continue a match that was cut short by the limit.
    pub fn repeat_pending(&mut self) -> Result<()> {
        if self.pending_len > 0 {
            self.repeat(self.pending_dist, self.pending_len)?;
        }
        Ok(())
    }

    /// Read up to `len` stored bytes straight into the dictionary.
    pub fn copy_uncompressed<R: Read>(&mut self, reader: &mut R, len: usize) -> Result<()> {
        let copy_size = (self.buf.len() - self.pos).min(len);
        reader.read_exact(&mut self.buf[self.pos..self.pos + copy_size])?;
        self.pos += copy_size;

        if self.full < self.pos {
            self.full = self.pos;
        }

        Ok(())
    }

    /// Copy newly decoded bytes to `out`; returns the number copied.
    pub fn flush(&mut self, out: &mut [u8]) -> usize {
        let copy_size = self.pos - self.start;
        if self.pos == self.buf.len() {
            self.pos = 0;
        }

        out[..copy_size].copy_from_slice(&self.buf[self.start..self.start + copy_size]);
        self.start = self.pos;

        copy_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_overlapping_repeat() {
        let mut lz = LzDecoder::new(16, None);
        lz.set_limit(10);
        lz.put_byte(b'a');
        lz.put_byte(b'b');
        lz.repeat(1, 6).unwrap();

        let mut out = [0u8; 16];
        let n = lz.flush(&mut out);
        assert_eq!(&out[..n], b"abababab");
    }

    #[test]
    fn test_distance_beyond_history() {
        let mut lz = LzDecoder::new(16, None);
        lz.set_limit(10);
        lz.put_byte(b'a');
        let err = lz.repeat(1, 2).unwrap_err();
        assert!(err.is_corruption());
        assert!(matches!(
            err,
            LzmaError::InvalidDistance {
                distance: 1,
                history_size: 1
            }
        ));
    }

    #[test]
    fn test_limit_leaves_pending() {
        let mut lz = LzDecoder::new(16, None);
        lz.set_limit(4);
        lz.put_byte(b'x');
        lz.repeat(0, 5).unwrap();
        assert!(!lz.has_space());
        assert!(lz.has_pending());

        let mut out = [0u8; 16];
        assert_eq!(lz.flush(&mut out), 4);

        lz.set_limit(8);
        lz.repeat_pending().unwrap();
        assert!(!lz.has_pending());
        assert_eq!(lz.flush(&mut out), 2);
        assert_eq!(&out[..2], b"xx");
    }

    #[test]
    fn test_wraps_around() {
        let mut lz = LzDecoder::new(8, None);
        let mut out = [0u8; 8];
        lz.set_limit(8);
        for b in b"01234567" {
            lz.put_byte(*b);
        }
        assert_eq!(lz.flush(&mut out), 8);
        assert_eq!(lz.pos(), 0);

        lz.set_limit(3);
        lz.repeat(7, 3).unwrap();
        assert_eq!(lz.flush(&mut out), 3);
        assert_eq!(&out[..3], b"012");
        assert_eq!(lz.get_byte(0), b'2');
        assert_eq!(lz.get_byte(3), b'7');
    }

    #[test]
    fn test_preset_dict_and_uncompressed() {
        let mut lz = LzDecoder::new(4, Some(b"abcdef"));
        assert_eq!(lz.get_byte(0), b'f');
        assert_eq!(lz.get_byte(3), b'c');

        let mut lz = LzDecoder::new(16, Some(b"hello"));
        lz.set_limit(3);
        lz.copy_uncompressed(&mut Cursor::new(b"xyz"), 3).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(lz.flush(&mut out), 3);
        assert_eq!(&out[..3], b"xyz");
        assert_eq!(lz.get_byte(3), b'o');

        lz.reset();
        assert!(lz.repeat(0, 2).is_err());
    }
}
