//! Greedy parser.
//!
//! Looks at the longest match and the rep distances at the current
//! position, plus the longest match one byte ahead, and settles for the
//! first choice that is not obviously beaten. No prices are consulted.

use crate::encoder::{EncoderCore, Symbol, SymbolParser};
use crate::lz::{LzEncoder, Matches};
use crate::model::{MATCH_LEN_MAX, MATCH_LEN_MIN, REPS};
use crate::options::MatchFinder;

/// Whether `small_dist` is so much shorter than `big_dist` that a match
/// one byte shorter at `small_dist` is the better deal.
#[inline]
fn change_pair(small_dist: u32, big_dist: u32) -> bool {
    small_dist < (big_dist >> 7)
}

/// Greedy parser.
#[derive(Debug)]
pub struct FastParser {
    matches: Matches,
}

impl FastParser {
    /// Window bytes needed before the dictionary and after the longest match.
    pub(crate) const EXTRA_SIZES: (u32, u32) = (1, MATCH_LEN_MAX as u32 - 1);

    pub(crate) fn new(nice_len: usize) -> Self {
        Self {
            matches: Matches::new(nice_len - 1),
        }
    }

    /// Memory usage in KiB of the window this parser needs.
    pub(crate) fn memory_usage(dict_size: u32, extra_before: u32, mf: MatchFinder) -> u64 {
        let (before, after) = Self::EXTRA_SIZES;
        LzEncoder::memory_usage(dict_size, extra_before.max(before), after, MATCH_LEN_MAX, mf)
    }

    /// Longest match found, if any.
    fn longest(&self) -> Option<(usize, u32)> {
        let count = self.matches.count;
        (count > 0).then(|| (self.matches.len[count - 1], self.matches.dist[count - 1]))
    }
}

impl SymbolParser for FastParser {
    fn next_symbol(&mut self, core: &mut EncoderCore) -> (usize, Symbol) {
        if core.read_ahead == -1 {
            core.get_matches(&mut self.matches);
        }

        let avail = core.lz.get_avail().min(MATCH_LEN_MAX);
        if avail < MATCH_LEN_MIN {
            return (1, Symbol::Literal);
        }

        let mut best_rep_len = 0;
        let mut best_rep_index = 0;
        for rep in 0..REPS {
            let len = core.lz.get_match_len(core.reps[rep] as usize, avail);
            if len < MATCH_LEN_MIN {
                continue;
            }

            if len >= core.nice_len {
                core.skip(len - 1);
                return (len, Symbol::Rep(rep));
            }

            if len > best_rep_len {
                best_rep_index = rep;
                best_rep_len = len;
            }
        }

        let mut main_len = 0;
        let mut main_dist = 0;
        if let Some((len, dist)) = self.longest() {
            main_len = len;
            main_dist = dist;

            if main_len >= core.nice_len {
                core.skip(main_len - 1);
                return (main_len, Symbol::Match(main_dist));
            }

            // Prefer a one byte shorter match when it is much closer.
            let m = &mut self.matches;
            while m.count > 1 && main_len == m.len[m.count - 2] + 1 {
                if !change_pair(m.dist[m.count - 2], main_dist) {
                    break;
                }
                m.count -= 1;
                main_len = m.len[m.count - 1];
                main_dist = m.dist[m.count - 1];
            }

            if main_len == MATCH_LEN_MIN && main_dist >= 0x80 {
                main_len = 1;
            }
        }

        if best_rep_len >= MATCH_LEN_MIN
            && (best_rep_len + 1 >= main_len
                || (best_rep_len + 2 >= main_len && main_dist >= (1 << 9))
                || (best_rep_len + 3 >= main_len && main_dist >= (1 << 15)))
        {
            core.skip(best_rep_len - 1);
            return (best_rep_len, Symbol::Rep(best_rep_index));
        }

        if main_len < MATCH_LEN_MIN || avail <= MATCH_LEN_MIN {
            return (1, Symbol::Literal);
        }

        // Peek one byte ahead; a better match there means a literal now.
        core.get_matches(&mut self.matches);
        if let Some((new_len, new_dist)) = self.longest() {
            if (new_len >= main_len && new_dist < main_dist)
                || (new_len == main_len + 1 && !change_pair(main_dist, new_dist))
                || new_len > main_len + 1
                || (new_len + 1 >= main_len
                    && main_len >= MATCH_LEN_MIN + 1
                    && change_pair(new_dist, main_dist))
            {
                return (1, Symbol::Literal);
            }
        }

        let limit = (main_len - 1).max(MATCH_LEN_MIN);
        for rep in 0..REPS {
            if core.lz.get_match_len(core.reps[rep] as usize, limit) == limit {
                return (1, Symbol::Literal);
            }
        }

        core.skip(main_len - 2);
        (main_len, Symbol::Match(main_dist))
    }
}
