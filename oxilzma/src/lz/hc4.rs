//! Hash chain match finder (HC4).
//!
//! Each position links to the previous position with the same 4-byte hash.
//! Walking the chain visits candidates from nearest to farthest; only
//! candidates longer than the best so far are reported.

use super::hash234::{self, Hash234};
use super::window::LzWindow;
use super::{Matches, normalize};
use tracing::trace;

/// HC4 match finder state.
#[derive(Debug)]
pub struct Hc4 {
    hash: Hash234,
    chain: Vec<i32>,
    depth_limit: usize,
    cyclic_size: i32,
    cyclic_pos: i32,
    lz_pos: i32,
}

/// Memory usage of HC4 in KiB.
pub(crate) fn memory_usage(dict_size: u32) -> u64 {
    hash234::memory_usage(dict_size) + dict_size as u64 / (1024 / 4) + 10
}

impl Hc4 {
    /// Create a finder for `dict_size`; a `depth_limit` of 0 picks a
    /// default from `nice_len`.
    pub fn new(dict_size: u32, nice_len: usize, depth_limit: usize) -> Self {
        let cyclic_size = dict_size as i32 + 1;
        Self {
            hash: Hash234::new(dict_size),
            chain: vec![0; cyclic_size as usize],
            depth_limit: if depth_limit > 0 {
                depth_limit
            } else {
                4 + nice_len / 4
            },
            cyclic_size,
            cyclic_pos: -1,
            lz_pos: cyclic_size,
        }
    }

    /// Advance one byte; returns the available bytes or 0 if the position
    /// was left pending.
    fn move_pos(&mut self, w: &mut LzWindow) -> usize {
        let avail = w.move_pos(4, 4);

        if avail != 0 {
            self.lz_pos += 1;
            if self.lz_pos == i32::MAX {
                let offset = i32::MAX - self.cyclic_size;
                trace!(offset, "normalizing HC4 positions");
                self.hash.normalize(offset);
                normalize(&mut self.chain, offset);
                self.lz_pos -= offset;
            }

            self.cyclic_pos += 1;
            if self.cyclic_pos == self.cyclic_size {
                self.cyclic_pos = 0;
            }
        }

        avail
    }

    /// Find matches at the next position.
    pub fn get_matches(&mut self, w: &mut LzWindow, matches: &mut Matches) {
        matches.count = 0;
        let mut match_len_limit = w.match_len_max;
        let mut nice_len_limit = w.nice_len;
        let avail = self.move_pos(w);

        if avail < match_len_limit {
            if avail == 0 {
                return;
            }
            match_len_limit = avail;
            nice_len_limit = nice_len_limit.min(avail);
        }

        let buf = &w.buf;
        let rp = w.read_pos as usize;

        self.hash.calc_hashes(buf, rp);
        let mut delta2 = (self.lz_pos - self.hash.hash2_pos()) as usize;
        let delta3 = (self.lz_pos - self.hash.hash3_pos()) as usize;
        let mut current_match = self.hash.hash4_pos();
        self.hash.update_tables(self.lz_pos);

        self.chain[self.cyclic_pos as usize] = current_match;

        let cyclic_size = self.cyclic_size as usize;
        let mut len_best = 0;

        // 2-byte and 3-byte heads first; their lengths are extended below.
        if delta2 < cyclic_size && buf[rp - delta2] == buf[rp] {
            len_best = 2;
            matches.push(2, delta2 as u32 - 1);
        }

        if delta2 != delta3 && delta3 < cyclic_size && buf[rp - delta3] == buf[rp] {
            len_best = 3;
            matches.push(3, delta3 as u32 - 1);
            delta2 = delta3;
        }

        if matches.count > 0 {
            while len_best < match_len_limit && buf[rp + len_best - delta2] == buf[rp + len_best] {
                len_best += 1;
            }
            matches.len[matches.count - 1] = len_best;

            if len_best >= nice_len_limit {
                return;
            }
        }

        len_best = len_best.max(3);

        let cyclic_pos = self.cyclic_pos as usize;
        let mut depth = self.depth_limit;
        loop {
            let delta = (self.lz_pos - current_match) as usize;

            if depth == 0 || delta >= cyclic_size {
                return;
            }
            depth -= 1;

            let slot = if delta > cyclic_pos {
                cyclic_pos + cyclic_size - delta
            } else {
                cyclic_pos - delta
            };
            current_match = self.chain[slot];

            // Test the byte at the current best length first; it rejects
            // most candidates with a single comparison.
            if buf[rp + len_best - delta] == buf[rp + len_best] && buf[rp - delta] == buf[rp] {
                let mut len = 1;
                while len < match_len_limit && buf[rp + len - delta] == buf[rp + len] {
                    len += 1;
                }

                if len > len_best {
                    len_best = len;
                    matches.push(len, delta as u32 - 1);

                    if len >= nice_len_limit {
                        return;
                    }
                }
            }
        }
    }

    /// Insert `len` positions without searching for matches.
    pub fn skip(&mut self, w: &mut LzWindow, len: usize) {
        for _ in 0..len {
            if self.move_pos(w) != 0 {
                self.hash.calc_hashes(&w.buf, w.read_pos as usize);
                self.chain[self.cyclic_pos as usize] = self.hash.hash4_pos();
                self.hash.update_tables(self.lz_pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finder(data: &[u8]) -> (Hc4, LzWindow) {
        let mut w = LzWindow::new(4096, 0, 0, 32, 273);
        w.copy_in(data);
        w.mark_finishing();
        (Hc4::new(4096, 32, 0), w)
    }

    #[test]
    fn test_memory_usage() {
        assert_eq!(memory_usage(1 << 20), hash234::memory_usage(1 << 20) + 4096 + 10);
    }

    #[test]
    fn test_finds_repeated_text() {
        let data = b"hello world, hello world, hello world!";
        let (mut hc4, mut w) = finder(data);
        let mut matches = Matches::new(31);

        hc4.skip(&mut w, 13);
        hc4.get_matches(&mut w, &mut matches);
        assert!(matches.count > 0);
        let best = matches.count - 1;
        assert_eq!(matches.dist[best], 12);
        assert_eq!(matches.len[best], 25);
        assert!(matches.verify(&w));
    }

    #[test]
    fn test_lengths_strictly_increase() {
        let data: Vec<u8> = b"abcabdabcabcabcdabcabcabcde".repeat(4);
        let (mut hc4, mut w) = finder(&data);
        let mut matches = Matches::new(31);

        while w.has_enough_data(0) {
            hc4.get_matches(&mut w, &mut matches);
            let lens = &matches.len[..matches.count];
            assert!(lens.windows(2).all(|p| p[0] < p[1]));
            assert!(lens.iter().all(|&l| l >= 2));
            assert!(matches.verify(&w));
        }
    }
}
