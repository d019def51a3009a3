//! Price-driven parser.
//!
//! Builds a lattice of up to [`OPTS`] positions ahead of the read position.
//! Every node records the cheapest known way to reach it together with the
//! state and rep distances that way leaves behind. Edges are literals,
//! short reps, rep matches and normal matches, plus two-step edges
//! (match, literal, rep0) that the greedy view would miss. Once the
//! lattice ends or a long enough match shows up, the cheapest path is
//! walked backwards, reversed, and handed out one symbol per call.

use crate::encoder::{EncoderCore, Symbol, SymbolParser};
use crate::lz::{LzEncoder, Matches};
use crate::model::{MATCH_LEN_MAX, MATCH_LEN_MIN, REPS, State};
use crate::options::MatchFinder;

/// Lattice size.
pub const OPTS: usize = 4096;

/// Price of an unreachable node.
const INFINITY_PRICE: u32 = 1 << 30;

/// How a node was reached when the last edge is not a single symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    /// One symbol from `opt_prev`.
    Single,
    /// A literal from `opt_prev - 1`, then `back_prev`.
    LiteralThen,
    /// `back_prev2` from `opt_prev2`, a literal, then `back_prev`.
    Chain {
        opt_prev2: usize,
        back_prev2: Symbol,
    },
}

/// One lattice node.
#[derive(Debug, Clone, Copy)]
struct Optimum {
    state: State,
    reps: [u32; REPS],
    price: u32,
    opt_prev: usize,
    back_prev: Symbol,
    path: Path,
}

impl Optimum {
    const UNREACHED: Self = Self {
        state: State::new(),
        reps: [0; REPS],
        price: INFINITY_PRICE,
        opt_prev: 0,
        back_prev: Symbol::Literal,
        path: Path::Single,
    };

    #[inline]
    fn reset(&mut self) {
        self.price = INFINITY_PRICE;
    }

    /// Reached by `back` from `cur`.
    #[inline]
    fn set_single(&mut self, price: u32, cur: usize, back: Symbol) {
        self.price = price;
        self.opt_prev = cur;
        self.back_prev = back;
        self.path = Path::Single;
    }

    /// Reached by a literal at `cur` followed by `back`.
    #[inline]
    fn set_literal_then(&mut self, price: u32, cur: usize, back: Symbol) {
        self.price = price;
        self.opt_prev = cur + 1;
        self.back_prev = back;
        self.path = Path::LiteralThen;
    }

    /// Reached by `back2` of `len2` bytes at `cur`, a literal, then `back`.
    #[inline]
    fn set_chain(&mut self, price: u32, cur: usize, back2: Symbol, len2: usize, back: Symbol) {
        self.price = price;
        self.opt_prev = cur + len2 + 1;
        self.back_prev = back;
        self.path = Path::Chain {
            opt_prev2: cur,
            back_prev2: back2,
        };
    }
}

/// Price-driven parser.
#[derive(Debug)]
pub struct NormalParser {
    opts: Vec<Optimum>,
    opt_cur: usize,
    opt_end: usize,
    matches: Matches,
    rep_lens: [usize; REPS],
}

impl NormalParser {
    /// Window bytes needed before the dictionary and after the longest match.
    pub(crate) const EXTRA_SIZES: (u32, u32) = (OPTS as u32, OPTS as u32);

    pub(crate) fn new(nice_len: usize) -> Self {
        Self {
            opts: vec![Optimum::UNREACHED; OPTS],
            opt_cur: 0,
            opt_end: 0,
            matches: Matches::new(nice_len - 1),
            rep_lens: [0; REPS],
        }
    }

    /// Memory usage in KiB of the window and lattice this parser needs.
    pub(crate) fn memory_usage(dict_size: u32, extra_before: u32, mf: MatchFinder) -> u64 {
        let (before, after) = Self::EXTRA_SIZES;
        LzEncoder::memory_usage(dict_size, extra_before.max(before), after, MATCH_LEN_MAX, mf)
            + (OPTS as u64 * 64) / 1024
    }

    /// Grow the lattice so that node `i` exists.
    #[inline]
    fn extend_to(&mut self, i: usize) {
        while self.opt_end < i {
            self.opt_end += 1;
            self.opts[self.opt_end].reset();
        }
    }

    /// Reverse the cheapest path ending at `opt_cur` so that `opt_prev`
    /// links point forward, then return the first step.
    fn convert_opts(&mut self) -> (usize, Symbol) {
        self.opt_end = self.opt_cur;
        let mut cur = self.opt_cur;
        let mut prev = self.opts[cur].opt_prev;

        loop {
            let opt = self.opts[cur];

            if opt.path != Path::Single {
                self.opts[prev].opt_prev = cur;
                self.opts[prev].back_prev = Symbol::Literal;
                cur = prev;
                prev -= 1;

                if let Path::Chain {
                    opt_prev2,
                    back_prev2,
                } = opt.path
                {
                    self.opts[prev].opt_prev = prev + 1;
                    self.opts[prev].back_prev = back_prev2;
                    cur = prev;
                    prev = opt_prev2;
                }
            }

            let temp = self.opts[prev].opt_prev;
            self.opts[prev].opt_prev = cur;
            cur = prev;
            prev = temp;

            if cur == 0 {
                break;
            }
        }

        self.opt_cur = self.opts[0].opt_prev;
        (self.opt_cur, self.opts[self.opt_cur].back_prev)
    }

    /// Derive the state and reps of node `opt_cur` from the path into it.
    fn update_opt_state_and_reps(&mut self) {
        let cur = self.opt_cur;
        let node = self.opts[cur];
        let mut opt_prev = node.opt_prev;
        debug_assert!(opt_prev < cur);

        let mut state = if node.path != Path::Single {
            opt_prev -= 1;
            let mut state = match node.path {
                Path::Chain {
                    opt_prev2,
                    back_prev2,
                } => {
                    let mut state = self.opts[opt_prev2].state;
                    if matches!(back_prev2, Symbol::Rep(_)) {
                        state.update_long_rep();
                    } else {
                        state.update_match();
                    }
                    state
                }
                _ => self.opts[opt_prev].state,
            };
            state.update_literal();
            state
        } else {
            self.opts[opt_prev].state
        };

        let reps = if opt_prev == cur - 1 {
            debug_assert!(matches!(node.back_prev, Symbol::Rep(0) | Symbol::Literal));
            if node.back_prev == Symbol::Rep(0) {
                state.update_short_rep();
            } else {
                state.update_literal();
            }
            self.opts[opt_prev].reps
        } else {
            let back = match node.path {
                Path::Chain {
                    opt_prev2,
                    back_prev2,
                } => {
                    opt_prev = opt_prev2;
                    state.update_long_rep();
                    back_prev2
                }
                _ => {
                    if matches!(node.back_prev, Symbol::Rep(_)) {
                        state.update_long_rep();
                    } else {
                        state.update_match();
                    }
                    node.back_prev
                }
            };

            let prev_reps = self.opts[opt_prev].reps;
            match back {
                Symbol::Rep(rep) => {
                    let mut reps = prev_reps;
                    reps[..=rep].rotate_right(1);
                    reps
                }
                Symbol::Match(dist) => [dist, prev_reps[0], prev_reps[1], prev_reps[2]],
                Symbol::Literal => prev_reps,
            }
        };

        self.opts[cur].state = state;
        self.opts[cur].reps = reps;
    }

    /// Literal and short rep edges from `opt_cur`, plus literal + rep0.
    fn calc_1_byte_prices(
        &mut self,
        core: &EncoderCore,
        pos: i32,
        pos_state: usize,
        avail: usize,
        any_rep_price: u32,
    ) {
        let cur = self.opt_cur;
        let node = self.opts[cur];
        let mut next_is_byte = false;
        let cur_byte = core.lz.get_byte(0);
        let match_byte = core.lz.get_byte(node.reps[0] as usize + 1);

        let literal_price = node.price
            + core.literal_price(cur_byte, match_byte, core.lz.get_byte(1), pos, node.state);
        if literal_price < self.opts[cur + 1].price {
            self.opts[cur + 1].set_single(literal_price, cur, Symbol::Literal);
            next_is_byte = true;
        }

        if match_byte == cur_byte
            && (self.opts[cur + 1].opt_prev == cur || self.opts[cur + 1].back_prev != Symbol::Rep(0))
        {
            let short_rep_price = core.short_rep_price(any_rep_price, node.state, pos_state);
            if short_rep_price <= self.opts[cur + 1].price {
                self.opts[cur + 1].set_single(short_rep_price, cur, Symbol::Rep(0));
                next_is_byte = true;
            }
        }

        if !next_is_byte && match_byte != cur_byte && avail > MATCH_LEN_MIN {
            let len_limit = core.nice_len.min(avail - 1);
            let len = core.lz.get_match_len_at(1, node.reps[0] as usize, len_limit);

            if len >= MATCH_LEN_MIN {
                let mut next_state = node.state;
                next_state.update_literal();
                let next_pos_state = core.pos_state(pos + 1);
                let price =
                    literal_price + core.long_rep_and_len_price(0, len, next_state, next_pos_state);

                let i = cur + 1 + len;
                self.extend_to(i);
                if price < self.opts[i].price {
                    self.opts[i].set_literal_then(price, cur, Symbol::Rep(0));
                }
            }
        }
    }

    /// Rep match edges from `opt_cur`, plus rep + literal + rep0. Returns
    /// the shortest normal match length still worth pricing.
    fn calc_long_rep_prices(
        &mut self,
        core: &EncoderCore,
        pos: i32,
        pos_state: usize,
        avail: usize,
        any_rep_price: u32,
    ) -> usize {
        let cur = self.opt_cur;
        let node = self.opts[cur];
        let mut start_len = MATCH_LEN_MIN;
        let len_limit = avail.min(core.nice_len);

        for rep in 0..REPS {
            let len = core.lz.get_match_len(node.reps[rep] as usize, len_limit);
            if len < MATCH_LEN_MIN {
                continue;
            }

            self.extend_to(cur + len);

            let long_rep_price = core.long_rep_price(any_rep_price, rep, node.state, pos_state);
            for i in (MATCH_LEN_MIN..=len).rev() {
                let price = long_rep_price + core.rep_len_price(i, pos_state);
                if price < self.opts[cur + i].price {
                    self.opts[cur + i].set_single(price, cur, Symbol::Rep(rep));
                }
            }

            if rep == 0 {
                start_len = len + 1;
            }

            let len2_limit = core.nice_len.min(avail.saturating_sub(len + 1));
            let len2 = core
                .lz
                .get_match_len_at(len + 1, node.reps[rep] as usize, len2_limit);

            if len2 >= MATCH_LEN_MIN {
                let mut price = long_rep_price + core.rep_len_price(len, pos_state);
                let mut next_state = node.state;
                next_state.update_long_rep();

                let cur_byte = core.lz.get_byte_at(len, 0);
                let match_byte = core.lz.get_byte(0);
                let prev_byte = core.lz.get_byte_at(len, 1);
                price += core.literal_price(cur_byte, match_byte, prev_byte, pos + len as i32, next_state);
                next_state.update_literal();

                let next_pos_state = core.pos_state(pos + len as i32 + 1);
                price += core.long_rep_and_len_price(0, len2, next_state, next_pos_state);

                let i = cur + len + 1 + len2;
                self.extend_to(i);
                if price < self.opts[i].price {
                    self.opts[i].set_chain(price, cur, Symbol::Rep(rep), len, Symbol::Rep(0));
                }
            }
        }

        start_len
    }

    /// Normal match edges from `opt_cur`, plus match + literal + rep0.
    fn calc_normal_match_prices(
        &mut self,
        core: &EncoderCore,
        pos: i32,
        pos_state: usize,
        avail: usize,
        any_match_price: u32,
        start_len: usize,
    ) {
        let m = &mut self.matches;
        if m.len[m.count - 1] > avail {
            m.count = 0;
            while m.len[m.count] < avail {
                m.count += 1;
            }
            m.len[m.count] = avail;
            m.count += 1;
        }

        if m.len[m.count - 1] < start_len {
            return;
        }

        let cur = self.opt_cur;
        let longest = self.matches.len[self.matches.count - 1];
        self.extend_to(cur + longest);

        let node = self.opts[cur];
        let normal_match_price = core.normal_match_price(any_match_price, node.state);

        let mut match_index = 0;
        while start_len > self.matches.len[match_index] {
            match_index += 1;
        }

        let mut len = start_len;
        loop {
            let dist = self.matches.dist[match_index];
            let match_and_len_price = core.match_and_len_price(normal_match_price, dist, len, pos_state);
            if match_and_len_price < self.opts[cur + len].price {
                self.opts[cur + len].set_single(match_and_len_price, cur, Symbol::Match(dist));
            }

            if len == self.matches.len[match_index] {
                let len2_limit = core.nice_len.min(avail.saturating_sub(len + 1));
                let len2 = core.lz.get_match_len_at(len + 1, dist as usize, len2_limit);

                if len2 >= MATCH_LEN_MIN {
                    let mut next_state = node.state;
                    next_state.update_match();

                    let cur_byte = core.lz.get_byte_at(len, 0);
                    let match_byte = core.lz.get_byte(0);
                    let prev_byte = core.lz.get_byte_at(len, 1);
                    let mut price = match_and_len_price
                        + core.literal_price(cur_byte, match_byte, prev_byte, pos + len as i32, next_state);
                    next_state.update_literal();

                    let next_pos_state = core.pos_state(pos + len as i32 + 1);
                    price += core.long_rep_and_len_price(0, len2, next_state, next_pos_state);

                    let i = cur + len + 1 + len2;
                    self.extend_to(i);
                    if price < self.opts[i].price {
                        self.opts[i].set_chain(price, cur, Symbol::Match(dist), len, Symbol::Rep(0));
                    }
                }

                match_index += 1;
                if match_index == self.matches.count {
                    break;
                }
            }

            len += 1;
        }
    }
}

impl SymbolParser for NormalParser {
    fn next_symbol(&mut self, core: &mut EncoderCore) -> (usize, Symbol) {
        // Hand out the rest of the last computed path first.
        if self.opt_cur < self.opt_end {
            let len = self.opts[self.opt_cur].opt_prev - self.opt_cur;
            self.opt_cur = self.opts[self.opt_cur].opt_prev;
            return (len, self.opts[self.opt_cur].back_prev);
        }

        debug_assert_eq!(self.opt_cur, self.opt_end);
        self.opt_cur = 0;
        self.opt_end = 0;

        if core.read_ahead == -1 {
            core.get_matches(&mut self.matches);
        }

        let mut avail = core.lz.get_avail().min(MATCH_LEN_MAX);
        if avail < MATCH_LEN_MIN {
            return (1, Symbol::Literal);
        }

        let mut rep_best = 0;
        for rep in 0..REPS {
            let len = core.lz.get_match_len(core.reps[rep] as usize, avail);
            self.rep_lens[rep] = if len < MATCH_LEN_MIN { 0 } else { len };
            if self.rep_lens[rep] > self.rep_lens[rep_best] {
                rep_best = rep;
            }
        }

        if self.rep_lens[rep_best] >= core.nice_len {
            let len = self.rep_lens[rep_best];
            core.skip(len - 1);
            return (len, Symbol::Rep(rep_best));
        }

        let mut main_len = 0;
        let mut main_dist = 0;
        if self.matches.count > 0 {
            main_len = self.matches.len[self.matches.count - 1];
            main_dist = self.matches.dist[self.matches.count - 1];

            if main_len >= core.nice_len {
                core.skip(main_len - 1);
                return (main_len, Symbol::Match(main_dist));
            }
        }

        let cur_byte = core.lz.get_byte(0);
        let match_byte = core.lz.get_byte(core.reps[0] as usize + 1);

        if main_len < MATCH_LEN_MIN && cur_byte != match_byte && self.rep_lens[rep_best] < MATCH_LEN_MIN {
            return (1, Symbol::Literal);
        }

        let mut pos = core.lz.get_pos();
        let mut pos_state = core.pos_state(pos);

        let literal_price = core.literal_price(cur_byte, match_byte, core.lz.get_byte(1), pos, core.state);
        self.opts[1].set_single(literal_price, 0, Symbol::Literal);

        let mut any_match_price = core.any_match_price(core.state, pos_state);
        let mut any_rep_price = core.any_rep_price(any_match_price, core.state);

        if match_byte == cur_byte {
            let short_rep_price = core.short_rep_price(any_rep_price, core.state, pos_state);
            if short_rep_price < self.opts[1].price {
                self.opts[1].set_single(short_rep_price, 0, Symbol::Rep(0));
            }
        }

        self.opt_end = main_len.max(self.rep_lens[rep_best]);
        if self.opt_end < MATCH_LEN_MIN {
            debug_assert_eq!(self.opt_end, 0);
            return (1, self.opts[1].back_prev);
        }

        core.update_prices();

        self.opts[0].state = core.state;
        self.opts[0].reps = core.reps;

        for i in MATCH_LEN_MIN..=self.opt_end {
            self.opts[i].reset();
        }

        for rep in 0..REPS {
            let rep_len = self.rep_lens[rep];
            if rep_len < MATCH_LEN_MIN {
                continue;
            }

            let long_rep_price = core.long_rep_price(any_rep_price, rep, core.state, pos_state);
            for len in (MATCH_LEN_MIN..=rep_len).rev() {
                let price = long_rep_price + core.rep_len_price(len, pos_state);
                if price < self.opts[len].price {
                    self.opts[len].set_single(price, 0, Symbol::Rep(rep));
                }
            }
        }

        {
            let mut len = (self.rep_lens[0] + 1).max(MATCH_LEN_MIN);
            if len <= main_len {
                let normal_match_price = core.normal_match_price(any_match_price, core.state);

                let mut i = 0;
                while len > self.matches.len[i] {
                    i += 1;
                }

                loop {
                    let dist = self.matches.dist[i];
                    let price = core.match_and_len_price(normal_match_price, dist, len, pos_state);
                    if price < self.opts[len].price {
                        self.opts[len].set_single(price, 0, Symbol::Match(dist));
                    }

                    if len == self.matches.len[i] {
                        i += 1;
                        if i == self.matches.count {
                            break;
                        }
                    }
                    len += 1;
                }
            }
        }

        avail = core.lz.get_avail().min(OPTS - 1);

        loop {
            self.opt_cur += 1;
            if self.opt_cur >= self.opt_end {
                break;
            }

            core.get_matches(&mut self.matches);
            if self.matches.count > 0 && self.matches.len[self.matches.count - 1] >= core.nice_len {
                break;
            }

            avail -= 1;
            pos += 1;
            pos_state = core.pos_state(pos);

            self.update_opt_state_and_reps();
            let node = self.opts[self.opt_cur];
            any_match_price = node.price + core.any_match_price(node.state, pos_state);
            any_rep_price = core.any_rep_price(any_match_price, node.state);

            self.calc_1_byte_prices(core, pos, pos_state, avail, any_rep_price);

            if avail >= MATCH_LEN_MIN {
                let start_len = self.calc_long_rep_prices(core, pos, pos_state, avail, any_rep_price);
                if self.matches.count > 0 {
                    self.calc_normal_match_prices(core, pos, pos_state, avail, any_match_price, start_len);
                }
            }
        }

        self.convert_opts()
    }

    fn reset(&mut self) {
        self.opt_cur = 0;
        self.opt_end = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> NormalParser {
        NormalParser::new(32)
    }

    #[test]
    fn test_convert_single_steps() {
        // 0 --lit--> 1 --match(5), len 3--> 4
        let mut p = parser();
        p.opts[1].set_single(10, 0, Symbol::Literal);
        p.opts[4].set_single(20, 1, Symbol::Match(5));
        p.opt_cur = 4;

        assert_eq!(p.convert_opts(), (1, Symbol::Literal));
        assert_eq!(p.opt_end, 4);

        let len = p.opts[p.opt_cur].opt_prev - p.opt_cur;
        let next = p.opts[p.opt_cur].opt_prev;
        assert_eq!((len, p.opts[next].back_prev), (3, Symbol::Match(5)));
        assert_eq!(next, 4);
    }

    #[test]
    fn test_convert_literal_then_rep0() {
        // A literal at 0 followed by a rep0 of length 3, recorded as one edge.
        let mut p = parser();
        p.opts[4].set_literal_then(30, 0, Symbol::Rep(0));
        p.opt_cur = 4;

        assert_eq!(p.convert_opts(), (1, Symbol::Literal));
        assert_eq!(p.opts[1].opt_prev, 4);
        assert_eq!(p.opts[4].back_prev, Symbol::Rep(0));
    }

    #[test]
    fn test_convert_chain() {
        // match(9) of 2 bytes at 0, literal at 2, rep0 of 2 bytes at 3.
        let mut p = parser();
        p.opts[5].set_chain(40, 0, Symbol::Match(9), 2, Symbol::Rep(0));
        p.opt_cur = 5;

        assert_eq!(p.convert_opts(), (2, Symbol::Match(9)));
        assert_eq!(p.opts[2].opt_prev, 3);
        assert_eq!(p.opts[3].back_prev, Symbol::Literal);
        assert_eq!(p.opts[3].opt_prev, 5);
        assert_eq!(p.opts[5].back_prev, Symbol::Rep(0));
    }

    #[test]
    fn test_update_state_after_match() {
        let mut p = parser();
        p.opts[0].state = State::new();
        p.opts[0].reps = [1, 2, 3, 4];
        p.opts[3].set_single(0, 0, Symbol::Match(99));
        p.opt_cur = 3;
        p.update_opt_state_and_reps();

        assert_eq!(p.opts[3].reps, [99, 1, 2, 3]);
        assert!(!p.opts[3].state.is_literal());
    }

    #[test]
    fn test_update_state_after_rep2() {
        let mut p = parser();
        p.opts[0].reps = [1, 2, 3, 4];
        p.opts[4].set_single(0, 0, Symbol::Rep(2));
        p.opt_cur = 4;
        p.update_opt_state_and_reps();

        assert_eq!(p.opts[4].reps, [3, 1, 2, 4]);
    }

    #[test]
    fn test_update_state_after_chain() {
        let mut p = parser();
        p.opts[0].reps = [1, 2, 3, 4];
        p.opts[6].set_chain(0, 0, Symbol::Match(42), 3, Symbol::Rep(0));
        p.opt_cur = 6;
        p.update_opt_state_and_reps();

        // The trailing rep0 reuses the distance of the leading match.
        assert_eq!(p.opts[6].reps, [42, 1, 2, 3]);
        assert!(!p.opts[6].state.is_literal());
    }

    #[test]
    fn test_memory_usage_includes_lattice() {
        let normal = NormalParser::memory_usage(1 << 20, 0, MatchFinder::Bt4);
        let window = LzEncoder::memory_usage(1 << 20, OPTS as u32, OPTS as u32, MATCH_LEN_MAX, MatchFinder::Bt4);
        assert_eq!(normal, window + 256);
    }
}
