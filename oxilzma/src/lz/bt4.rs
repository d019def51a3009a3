//! Binary tree match finder (BT4).
//!
//! Positions sharing a 4-byte hash form a binary search tree ordered by the
//! bytes that follow them. Each search re-roots the tree at the current
//! position, so the tree is maintained even when matches are skipped.

use super::hash234::{self, Hash234};
use super::window::LzWindow;
use super::{Matches, normalize};
use tracing::trace;

/// BT4 match finder state.
#[derive(Debug)]
pub struct Bt4 {
    hash: Hash234,
    tree: Vec<i32>,
    depth_limit: usize,
    cyclic_size: i32,
    cyclic_pos: i32,
    lz_pos: i32,
}

/// Memory usage of BT4 in KiB.
pub(crate) fn memory_usage(dict_size: u32) -> u64 {
    hash234::memory_usage(dict_size) + dict_size as u64 / (1024 / 8) + 10
}

impl Bt4 {
    /// Create a finder for `dict_size`; a `depth_limit` of 0 picks a
    /// default from `nice_len`.
    pub fn new(dict_size: u32, nice_len: usize, depth_limit: usize) -> Self {
        let cyclic_size = dict_size as i32 + 1;
        Self {
            hash: Hash234::new(dict_size),
            tree: vec![0; cyclic_size as usize * 2],
            depth_limit: if depth_limit > 0 {
                depth_limit
            } else {
                16 + nice_len / 2
            },
            cyclic_size,
            cyclic_pos: -1,
            lz_pos: cyclic_size,
        }
    }

    fn move_pos(&mut self, w: &mut LzWindow) -> usize {
        let avail = w.move_pos(w.nice_len as i32, 4);

        if avail != 0 {
            self.lz_pos += 1;
            if self.lz_pos == i32::MAX {
                let offset = i32::MAX - self.cyclic_size;
                trace!(offset, "normalizing BT4 positions");
                self.hash.normalize(offset);
                normalize(&mut self.tree, offset);
                self.lz_pos -= offset;
            }

            self.cyclic_pos += 1;
            if self.cyclic_pos == self.cyclic_size {
                self.cyclic_pos = 0;
            }
        }

        avail
    }

    /// Index of the tree node pair of the position `delta` bytes back.
    #[inline]
    fn pair_index(&self, delta: usize) -> usize {
        let cyclic_pos = self.cyclic_pos as usize;
        let slot = if delta > cyclic_pos {
            cyclic_pos + self.cyclic_size as usize - delta
        } else {
            cyclic_pos - delta
        };
        slot << 1
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

        let cyclic_size = self.cyclic_size as usize;
        let mut len_best = 0;

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
                self.skip_tree(buf, rp, nice_len_limit, current_match);
                return;
            }
        }

        len_best = len_best.max(3);

        let mut depth = self.depth_limit;
        let mut ptr0 = ((self.cyclic_pos as usize) << 1) + 1;
        let mut ptr1 = (self.cyclic_pos as usize) << 1;
        let mut len0 = 0;
        let mut len1 = 0;

        loop {
            let delta = (self.lz_pos - current_match) as usize;

            if depth == 0 || delta >= cyclic_size {
                self.tree[ptr0] = 0;
                self.tree[ptr1] = 0;
                return;
            }
            depth -= 1;

            let pair = self.pair_index(delta);
            let mut len = len0.min(len1);

            if buf[rp + len - delta] == buf[rp + len] {
                len += 1;
                while len < match_len_limit && buf[rp + len - delta] == buf[rp + len] {
                    len += 1;
                }

                if len > len_best {
                    len_best = len;
                    matches.push(len, delta as u32 - 1);

                    if len >= nice_len_limit {
                        self.tree[ptr1] = self.tree[pair];
                        self.tree[ptr0] = self.tree[pair + 1];
                        return;
                    }
                }
            }

            if buf[rp + len - delta] < buf[rp + len] {
                self.tree[ptr1] = current_match;
                ptr1 = pair + 1;
                current_match = self.tree[ptr1];
                len1 = len;
            } else {
                self.tree[ptr0] = current_match;
                ptr0 = pair;
                current_match = self.tree[ptr0];
                len0 = len;
            }
        }
    }

    /// Re-root the tree at the current position without collecting matches.
    fn skip_tree(&mut self, buf: &[u8], rp: usize, nice_len_limit: usize, mut current_match: i32) {
        let cyclic_size = self.cyclic_size as usize;
        let mut depth = self.depth_limit;
        let mut ptr0 = ((self.cyclic_pos as usize) << 1) + 1;
        let mut ptr1 = (self.cyclic_pos as usize) << 1;
        let mut len0 = 0;
        let mut len1 = 0;

        loop {
            let delta = (self.lz_pos - current_match) as usize;

            if depth == 0 || delta >= cyclic_size {
                self.tree[ptr0] = 0;
                self.tree[ptr1] = 0;
                return;
            }
            depth -= 1;

            let pair = self.pair_index(delta);
            let mut len = len0.min(len1);

            if buf[rp + len - delta] == buf[rp + len] {
                loop {
                    len += 1;
                    if len == nice_len_limit {
                        self.tree[ptr1] = self.tree[pair];
                        self.tree[ptr0] = self.tree[pair + 1];
                        return;
                    }
                    if buf[rp + len - delta] != buf[rp + len] {
                        break;
                    }
                }
            }

            if buf[rp + len - delta] < buf[rp + len] {
                self.tree[ptr1] = current_match;
                ptr1 = pair + 1;
                current_match = self.tree[ptr1];
                len1 = len;
            } else {
                self.tree[ptr0] = current_match;
                ptr0 = pair;
                current_match = self.tree[ptr0];
                len0 = len;
            }
        }
    }

    /// Insert `len` positions without searching for matches.
    pub fn skip(&mut self, w: &mut LzWindow, len: usize) {
        for _ in 0..len {
            let avail = self.move_pos(w);
            if avail == 0 {
                continue;
            }
            let nice_len_limit = w.nice_len.min(avail);

            let rp = w.read_pos as usize;
            self.hash.calc_hashes(&w.buf, rp);
            let current_match = self.hash.hash4_pos();
            self.hash.update_tables(self.lz_pos);

            self.skip_tree(&w.buf, rp, nice_len_limit, current_match);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lz::hc4::Hc4;

    fn window(data: &[u8]) -> LzWindow {
        let mut w = LzWindow::new(1 << 16, 0, 0, 64, 273);
        w.copy_in(data);
        w.mark_finishing();
        w
    }

    #[test]
    fn test_memory_usage() {
        assert_eq!(memory_usage(1 << 20), hash234::memory_usage(1 << 20) + 8192 + 10);
    }

    #[test]
    fn test_finds_repeated_text() {
        let data = b"hello world, hello world, hello world!";
        let mut w = window(data);
        let mut bt4 = Bt4::new(1 << 16, 64, 0);
        let mut matches = Matches::new(63);

        bt4.skip(&mut w, 13);
        bt4.get_matches(&mut w, &mut matches);
        assert!(matches.count > 0);
        let best = matches.count - 1;
        assert_eq!(matches.dist[best], 12);
        assert_eq!(matches.len[best], 25);
    }

    #[test]
    fn test_best_match_agrees_with_hc4() {
        // With unlimited depth both finders must see the longest match.
        let mut seed = 12345u64;
        let data: Vec<u8> = (0..3000)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
                b"abcd"[(seed >> 62) as usize]
            })
            .collect();

        let mut w_bt = window(&data);
        let mut w_hc = window(&data);
        let mut bt4 = Bt4::new(1 << 16, 64, 10_000);
        let mut hc4 = Hc4::new(1 << 16, 64, 10_000);
        let mut m_bt = Matches::new(63);
        let mut m_hc = Matches::new(63);

        while w_bt.has_enough_data(0) {
            bt4.get_matches(&mut w_bt, &mut m_bt);
            hc4.get_matches(&mut w_hc, &mut m_hc);
            assert!(m_bt.verify(&w_bt));
            let best_bt = m_bt.count.checked_sub(1).map_or(0, |i| m_bt.len[i]);
            let best_hc = m_hc.count.checked_sub(1).map_or(0, |i| m_hc.len[i]);
            assert_eq!(best_bt, best_hc, "at position {}", w_bt.get_pos());
        }
    }
}
