//! LZ77 layer: sliding windows and match finders.
//!
//! The encoder side is an [`LzEncoder`] that owns a [`LzWindow`] together
//! with the selected match finder. The decoder side is the circular
//! [`LzDecoder`] dictionary.

mod bt4;
mod decoder;
mod hash234;
mod hc4;
mod window;

pub use decoder::LzDecoder;
pub use window::LzWindow;

use crate::options::MatchFinder;
use bt4::Bt4;
use hc4::Hc4;

/// Matches found at one position, sorted by strictly increasing length.
#[derive(Debug, Clone)]
pub struct Matches {
    /// Match lengths.
    pub len: Vec<usize>,
    /// Zero-based match distances.
    pub dist: Vec<u32>,
    /// Number of valid entries.
    pub count: usize,
}

impl Matches {
    /// Create an empty list with room for `capacity` matches.
    pub fn new(capacity: usize) -> Self {
        Self {
            len: vec![0; capacity],
            dist: vec![0; capacity],
            count: 0,
        }
    }

    #[inline]
    fn push(&mut self, len: usize, dist: u32) {
        self.len[self.count] = len;
        self.dist[self.count] = dist;
        self.count += 1;
    }

    /// Whether every match really occurs in the window.
    pub fn verify(&self, window: &LzWindow) -> bool {
        (0..self.count).all(|i| window.get_match_len(self.dist[i] as usize, self.len[i]) == self.len[i])
    }
}

/// Subtract `offset` from stored positions; positions at or below it are
/// too old to matter and become 0.
pub(crate) fn normalize(positions: &mut [i32], offset: i32) {
    for p in positions.iter_mut() {
        *p = if *p <= offset { 0 } else { *p - offset };
    }
}

/// The match finder selected by [`MatchFinder`].
#[derive(Debug)]
enum MatchFinderImpl {
    Hc4(Hc4),
    Bt4(Bt4),
}

/// Sliding window plus match finder: the encoder's view of the input.
#[derive(Debug)]
pub struct LzEncoder {
    window: LzWindow,
    finder: MatchFinderImpl,
}

impl LzEncoder {
    /// Create an encoder window.
    ///
    /// `extra_before` and `extra_after` are the bytes the caller needs to
    /// look at beyond the dictionary and the longest match.
    pub fn new(
        dict_size: u32,
        extra_before: u32,
        extra_after: u32,
        nice_len: usize,
        match_len_max: usize,
        mf: MatchFinder,
        depth_limit: usize,
    ) -> Self {
        let window = LzWindow::new(dict_size, extra_before, extra_after, nice_len, match_len_max);
        let finder = match mf {
            MatchFinder::Hc4 => MatchFinderImpl::Hc4(Hc4::new(dict_size, nice_len, depth_limit)),
            MatchFinder::Bt4 => MatchFinderImpl::Bt4(Bt4::new(dict_size, nice_len, depth_limit)),
        };
        Self { window, finder }
    }

    /// Memory usage in KiB of an encoder window with the given geometry.
    pub fn memory_usage(
        dict_size: u32,
        extra_before: u32,
        extra_after: u32,
        match_len_max: usize,
        mf: MatchFinder,
    ) -> u64 {
        let buf = window::buf_size(dict_size, extra_before, extra_after, match_len_max) as u64;
        let finder = match mf {
            MatchFinder::Hc4 => hc4::memory_usage(dict_size),
            MatchFinder::Bt4 => bt4::memory_usage(dict_size),
        };
        buf / 1024 + 10 + finder
    }

    /// The window, for read-only inspection.
    #[inline]
    pub fn window(&self) -> &LzWindow {
        &self.window
    }

    /// Copy input into the window; returns the number of bytes used.
    pub fn fill_window(&mut self, data: &[u8]) -> usize {
        let used = self.window.copy_in(data);
        self.process_pending_bytes();
        used
    }

    /// Load a preset dictionary into an unused window.
    pub fn set_preset_dict(&mut self, dict_size: u32, dict: &[u8]) {
        let len = self.window.copy_preset(dict_size, dict);
        self.skip(len);
    }

    /// Make every buffered byte available for encoding.
    pub fn set_flushing(&mut self) {
        self.window.mark_flushing();
        self.process_pending_bytes();
    }

    /// Make every buffered byte available; no more input will follow.
    pub fn set_finishing(&mut self) {
        self.window.mark_finishing();
        self.process_pending_bytes();
    }

    fn process_pending_bytes(&mut self) {
        if let Some(pending) = self.window.take_pending() {
            self.skip(pending);
        }
    }

    /// Advance one byte and collect the matches found there.
    pub fn get_matches(&mut self, matches: &mut Matches) {
        match &mut self.finder {
            MatchFinderImpl::Hc4(mf) => mf.get_matches(&mut self.window, matches),
            MatchFinderImpl::Bt4(mf) => mf.get_matches(&mut self.window, matches),
        }
        debug_assert!(matches.verify(&self.window));
    }

    /// Advance `len` bytes, updating the finder without searching.
    pub fn skip(&mut self, len: usize) {
        match &mut self.finder {
            MatchFinderImpl::Hc4(mf) => mf.skip(&mut self.window, len),
            MatchFinderImpl::Bt4(mf) => mf.skip(&mut self.window, len),
        }
    }

    /// See [`LzWindow::is_started`].
    pub fn is_started(&self) -> bool {
        self.window.is_started()
    }

    /// See [`LzWindow::has_enough_data`].
    #[inline]
    pub fn has_enough_data(&self, already_read: usize) -> bool {
        self.window.has_enough_data(already_read)
    }

    /// See [`LzWindow::get_avail`].
    #[inline]
    pub fn get_avail(&self) -> usize {
        self.window.get_avail()
    }

    /// See [`LzWindow::get_pos`].
    #[inline]
    pub fn get_pos(&self) -> i32 {
        self.window.get_pos()
    }

    /// See [`LzWindow::get_byte`].
    #[inline]
    pub fn get_byte(&self, backward: usize) -> u8 {
        self.window.get_byte(backward)
    }

    /// See [`LzWindow::get_byte_at`].
    #[inline]
    pub fn get_byte_at(&self, forward: usize, backward: usize) -> u8 {
        self.window.get_byte_at(forward, backward)
    }

    /// See [`LzWindow::get_match_len`].
    #[inline]
    pub fn get_match_len(&self, dist: usize, len_limit: usize) -> usize {
        self.window.get_match_len(dist, len_limit)
    }

    /// See [`LzWindow::get_match_len_at`].
    #[inline]
    pub fn get_match_len_at(&self, forward: usize, dist: usize, len_limit: usize) -> usize {
        self.window.get_match_len_at(forward, dist, len_limit)
    }

    /// Write `len` bytes starting `backward - 1` bytes behind the read
    /// position to `out`.
    pub fn copy_uncompressed<W: std::io::Write>(
        &self,
        out: &mut W,
        backward: usize,
        len: usize,
    ) -> std::io::Result<()> {
        out.write_all(self.window.uncompressed(backward, len))
    }
}
