//! Encoder-side sliding window.
//!
//! The window keeps `dict_size` bytes of history before the read position
//! plus enough look-ahead after it for the longest match. New input is
//! appended at `write_pos`; when the read position nears the end of the
//! buffer, everything still needed is moved back to the start.
//!
//! Positions are `i32`: the read position starts at -1 ("nothing read yet")
//! and the match finders store positions in `i32` tables.

/// Sliding window of the LZ encoder.
#[derive(Debug)]
pub struct LzWindow {
    pub(super) buf: Vec<u8>,
    keep_size_before: i32,
    keep_size_after: i32,
    pub(super) match_len_max: usize,
    pub(super) nice_len: usize,
    pub(super) read_pos: i32,
    read_limit: i32,
    finishing: bool,
    write_pos: i32,
    pending_size: i32,
}

/// Buffer size needed for the given window geometry.
pub(crate) fn buf_size(
    dict_size: u32,
    extra_before: u32,
    extra_after: u32,
    match_len_max: usize,
) -> usize {
    let keep_before = extra_before as usize + dict_size as usize;
    let keep_after = extra_after as usize + match_len_max;
    let reserve = (dict_size as usize / 2 + (256 << 10)).min(512 << 20);
    keep_before + keep_after + reserve
}

impl LzWindow {
    /// Create a window for `dict_size` bytes of history.
    pub fn new(
        dict_size: u32,
        extra_before: u32,
        extra_after: u32,
        nice_len: usize,
        match_len_max: usize,
    ) -> Self {
        let size = buf_size(dict_size, extra_before, extra_after, match_len_max);
        Self {
            buf: vec![0u8; size],
            keep_size_before: (extra_before + dict_size) as i32,
            keep_size_after: (extra_after as usize + match_len_max) as i32,
            match_len_max,
            nice_len,
            read_pos: -1,
            read_limit: -1,
            finishing: false,
            write_pos: 0,
            pending_size: 0,
        }
    }

    /// Move the data still needed back to the start of the buffer.
    ///
    /// The offset is a multiple of 16 so that positions keep their
    /// alignment relative to the start of the data.
    fn move_window(&mut self) {
        let move_offset = (self.read_pos + 1 - self.keep_size_before) & !15;
        let move_size = self.write_pos - move_offset;
        self.buf.copy_within(
            move_offset as usize..(move_offset + move_size) as usize,
            0,
        );

        self.read_pos -= move_offset;
        self.read_limit -= move_offset;
        self.write_pos -= move_offset;
    }

    /// Append as much of `data` as fits; returns the number of bytes used.
    pub(super) fn copy_in(&mut self, data: &[u8]) -> usize {
        debug_assert!(!self.finishing);

        if self.read_pos >= self.buf.len() as i32 - self.keep_size_after {
            self.move_window();
        }

        let len = data.len().min(self.buf.len() - self.write_pos as usize);
        let start = self.write_pos as usize;
        self.buf[start..start + len].copy_from_slice(&data[..len]);
        self.write_pos += len as i32;

        if self.write_pos >= self.keep_size_after {
            self.read_limit = self.write_pos - self.keep_size_after;
        }

        len
    }

    /// Append preset dictionary bytes into an unused window; returns the
    /// number of bytes taken from the tail of `dict`.
    pub(super) fn copy_preset(&mut self, dict_size: u32, dict: &[u8]) -> usize {
        debug_assert!(!self.is_started());
        debug_assert_eq!(self.write_pos, 0);

        let copy_size = dict.len().min(dict_size as usize);
        let offset = dict.len() - copy_size;
        self.buf[..copy_size].copy_from_slice(&dict[offset..]);
        self.write_pos += copy_size as i32;
        copy_size
    }

    /// Positions that were skipped for lack of look-ahead and can now be
    /// hashed. Rewinds the read position so they can be replayed.
    pub(super) fn take_pending(&mut self) -> Option<usize> {
        if self.pending_size > 0 && self.read_pos < self.read_limit {
            self.read_pos -= self.pending_size;
            let pending = self.pending_size;
            self.pending_size = 0;
            Some(pending as usize)
        } else {
            None
        }
    }

    /// Allow encoding all buffered bytes without ending the stream.
    pub(super) fn mark_flushing(&mut self) {
        self.read_limit = self.write_pos - 1;
    }

    /// Allow encoding all buffered bytes, including short tails.
    pub(super) fn mark_finishing(&mut self) {
        self.read_limit = self.write_pos - 1;
        self.finishing = true;
    }

    /// Advance the read position by one byte.
    ///
    /// Returns the number of bytes available from the new position, or 0
    /// if there are too few to search for matches; such positions are
    /// counted as pending and replayed once more input arrives.
    pub(super) fn move_pos(&mut self, required_for_flushing: i32, required_for_finishing: i32) -> usize {
        debug_assert!(required_for_flushing >= required_for_finishing);

        self.read_pos += 1;
        let mut avail = self.write_pos - self.read_pos;

        if avail < required_for_flushing && (avail < required_for_finishing || !self.finishing) {
            self.pending_size += 1;
            avail = 0;
        }

        avail as usize
    }

    /// Whether any byte has been consumed yet.
    pub fn is_started(&self) -> bool {
        self.read_pos != -1
    }

    /// Whether the encoder may consume another byte, given that it has
    /// already looked `already_read` bytes ahead.
    pub fn has_enough_data(&self, already_read: usize) -> bool {
        self.read_pos - (already_read as i32) < self.read_limit
    }

    /// Bytes available from the read position, including it.
    pub fn get_avail(&self) -> usize {
        (self.write_pos - self.read_pos) as usize
    }

    /// Current read position inside the buffer.
    pub fn get_pos(&self) -> i32 {
        self.read_pos
    }

    /// Byte `backward` positions behind the read position.
    #[inline]
    pub fn get_byte(&self, backward: usize) -> u8 {
        self.buf[self.read_pos as usize - backward]
    }

    /// Byte at `read_pos + forward - backward`.
    #[inline]
    pub fn get_byte_at(&self, forward: usize, backward: usize) -> u8 {
        self.buf[self.read_pos as usize + forward - backward]
    }

    /// Length of the match at distance `dist` (zero based), up to `len_limit`.
    #[inline]
    pub fn get_match_len(&self, dist: usize, len_limit: usize) -> usize {
        self.get_match_len_at(0, dist, len_limit)
    }

    /// Length of the match at distance `dist` starting `forward` bytes
    /// ahead of the read position.
    pub fn get_match_len_at(&self, forward: usize, dist: usize, len_limit: usize) -> usize {
        let cur = self.read_pos as usize + forward;
        let back = cur - dist - 1;
        let mut len = 0;
        while len < len_limit && self.buf[cur + len] == self.buf[back + len] {
            len += 1;
        }
        len
    }

    /// Bytes starting `backward - 1` positions behind the read position.
    pub fn uncompressed(&self, backward: usize, len: usize) -> &[u8] {
        let start = (self.read_pos + 1) as usize - backward;
        &self.buf[start..start + len]
    }
}
