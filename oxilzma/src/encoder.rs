//! LZMA symbol encoder.
//!
//! [`LzmaEncoder`] turns the bytes in an [`LzEncoder`] window into range
//! coded LZMA symbols. Which symbol to emit next is decided by a parser:
//! the greedy [`FastParser`] or the price-driven [`NormalParser`]. Both
//! look at the window through [`EncoderCore`], which also owns the model,
//! the range encoder and the cached price tables.
//!
//! The encoder does not frame its output. LZMA1 writers drain the range
//! encoder after every call; the LZMA2 writer stops at chunk boundaries via
//! [`LzmaEncoder::encode_for_lzma2`] and decides how to emit the chunk.

use crate::decoder::END_MARKER_DIST;
use crate::fast::FastParser;
use crate::lz::{LzEncoder, Matches};
use crate::model::{
    ALIGN_BITS, ALIGN_MASK, ALIGN_SIZE, DIST_MODEL_END, DIST_MODEL_START, DIST_SLOTS, DIST_STATES,
    FULL_DISTANCES, LEN_LOW_SYMBOLS, LEN_MID_SYMBOLS, LengthProbs, LzmaModel, LzmaProperties,
    MATCH_LEN_MAX, MATCH_LEN_MIN, REPS, State, dist_state,
};
use crate::optimal::NormalParser;
use crate::options::{MatchFinder, Mode};
use crate::range_coder::{
    RangeEncoder, bit_price, bit_tree_price, direct_bits_price, reverse_bit_tree_price,
};
use tracing::debug;

/// Largest uncompressed size an LZMA2 chunk may reach before it is closed.
/// One more symbol may still be added, hence the room for a longest match.
const LZMA2_UNCOMPRESSED_LIMIT: usize = (2 << 20) - MATCH_LEN_MAX;

/// Range encoder output at which an LZMA2 chunk is closed.
const LZMA2_COMPRESSED_LIMIT: usize = (64 << 10) - 26;

/// Matches encoded between refreshes of the distance price tables.
const DIST_PRICE_UPDATE_INTERVAL: i32 = FULL_DISTANCES as i32;

/// Aligned distances encoded between refreshes of the align prices.
const ALIGN_PRICE_UPDATE_INTERVAL: i32 = ALIGN_SIZE as i32;

/// Lengths encoded per position state between length price refreshes.
const LEN_PRICE_UPDATE_INTERVAL: i32 = 32;

/// Fixed encoder overhead in KiB, excluding the window and the parser.
const ENCODER_BASE_MEMORY: u64 = 80;

/// One decision of a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// A single literal byte.
    Literal,
    /// A match reusing rep distance `0..4`. Length 1 with rep 0 is a short rep.
    Rep(usize),
    /// A match with a new zero-based distance.
    Match(u32),
}

/// Distance slot of a zero-based distance.
pub fn dist_slot(dist: u32) -> u32 {
    if dist <= DIST_MODEL_START {
        return dist;
    }

    let i = 31 - dist.leading_zeros();
    (i << 1) + ((dist >> (i - 1)) & 1)
}

/// Length encoder: the shared length coding plus cached prices per
/// position state.
#[derive(Debug)]
struct LengthEncoder {
    counters: Vec<i32>,
    prices: Vec<Vec<u32>>,
}

impl LengthEncoder {
    fn new(pb: u32, nice_len: usize) -> Self {
        let pos_states = 1usize << pb;
        let len_symbols = (nice_len - MATCH_LEN_MIN + 1).max(LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS);
        Self {
            counters: vec![0; pos_states],
            prices: vec![vec![0; len_symbols]; pos_states],
        }
    }

    fn reset(&mut self) {
        self.counters.fill(0);
    }

    fn encode(&mut self, rc: &mut RangeEncoder, probs: &mut LengthProbs, len: usize, pos_state: usize) {
        let mut len = len - MATCH_LEN_MIN;
        if len < LEN_LOW_SYMBOLS {
            rc.encode_bit(&mut probs.choice[0], 0);
            rc.encode_bit_tree(&mut probs.low[pos_state], len as u32);
        } else {
            rc.encode_bit(&mut probs.choice[0], 1);
            len -= LEN_LOW_SYMBOLS;
            if len < LEN_MID_SYMBOLS {
                rc.encode_bit(&mut probs.choice[1], 0);
                rc.encode_bit_tree(&mut probs.mid[pos_state], len as u32);
            } else {
                rc.encode_bit(&mut probs.choice[1], 1);
                rc.encode_bit_tree(&mut probs.high, (len - LEN_MID_SYMBOLS) as u32);
            }
        }

        self.counters[pos_state] -= 1;
    }

    #[inline]
    fn price(&self, len: usize, pos_state: usize) -> u32 {
        self.prices[pos_state][len - MATCH_LEN_MIN]
    }

    fn update_prices(&mut self, probs: &LengthProbs) {
        for pos_state in 0..self.counters.len() {
            if self.counters[pos_state] <= 0 {
                self.counters[pos_state] = LEN_PRICE_UPDATE_INTERVAL;
                self.update_pos_state(probs, pos_state);
            }
        }
    }

    fn update_pos_state(&mut self, probs: &LengthProbs, pos_state: usize) {
        let prices = &mut self.prices[pos_state];

        let choice0 = bit_price(probs.choice[0], 0);
        for (i, price) in prices.iter_mut().enumerate().take(LEN_LOW_SYMBOLS) {
            *price = choice0 + bit_tree_price(&probs.low[pos_state], i as u32);
        }

        let choice0 = bit_price(probs.choice[0], 1);
        let choice1 = bit_price(probs.choice[1], 0);
        for i in LEN_LOW_SYMBOLS..LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS {
            prices[i] =
                choice0 + choice1 + bit_tree_price(&probs.mid[pos_state], (i - LEN_LOW_SYMBOLS) as u32);
        }

        let choice1 = bit_price(probs.choice[1], 1);
        for i in LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS..prices.len() {
            let symbol = (i - LEN_LOW_SYMBOLS - LEN_MID_SYMBOLS) as u32;
            prices[i] = choice0 + choice1 + bit_tree_price(&probs.high, symbol);
        }
    }
}

/// Price of a literal coded without a match byte.
fn normal_literal_price(probs: &[u16], symbol: u32) -> u32 {
    let mut price = 0;
    let mut symbol = symbol | 0x100;
    loop {
        let bit = symbol & 1;
        symbol >>= 1;
        price += bit_price(probs[symbol as usize], bit);
        if symbol == 1 {
            return price;
        }
    }
}

/// Price of a literal coded right after a match, against `match_byte`.
fn matched_literal_price(probs: &[u16], symbol: u32, match_byte: u32) -> u32 {
    let mut price = 0;
    let mut offset = 0x100;
    let mut symbol = symbol | 0x100;
    let mut match_byte = match_byte;
    loop {
        match_byte <<= 1;
        let match_bit = match_byte & offset;
        let index = offset + match_bit + (symbol >> 8);
        let bit = (symbol >> 7) & 1;
        price += bit_price(probs[index as usize], bit);
        symbol <<= 1;
        offset &= !(match_byte ^ symbol);
        if symbol >= 0x100 << 8 {
            return price;
        }
    }
}

/// Everything a parser needs: the window, the model and the prices.
///
/// `read_ahead` counts the bytes the parser has pulled through the match
/// finder beyond the last encoded symbol; -1 means none, not even the
/// byte at the read position.
#[derive(Debug)]
pub struct EncoderCore {
    pub(crate) rc: RangeEncoder,
    pub(crate) lz: LzEncoder,
    model: LzmaModel,
    pub(crate) state: State,
    pub(crate) reps: [u32; REPS],
    pos_mask: usize,
    pub(crate) nice_len: usize,
    match_len_encoder: LengthEncoder,
    rep_len_encoder: LengthEncoder,
    dist_price_count: i32,
    align_price_count: i32,
    dist_slot_prices_size: usize,
    dist_slot_prices: [[u32; DIST_SLOTS]; DIST_STATES],
    full_dist_prices: [[u32; FULL_DISTANCES]; DIST_STATES],
    align_prices: [u32; ALIGN_SIZE],
    pub(crate) read_ahead: i32,
    uncompressed_size: usize,
}

impl EncoderCore {
    fn new(lz: LzEncoder, props: LzmaProperties, dict_size: u32, nice_len: usize) -> Self {
        Self {
            rc: RangeEncoder::new(LZMA2_COMPRESSED_LIMIT + 64),
            lz,
            model: LzmaModel::new(props),
            state: State::new(),
            reps: [0; REPS],
            pos_mask: props.pos_mask(),
            nice_len,
            match_len_encoder: LengthEncoder::new(props.pb, nice_len),
            rep_len_encoder: LengthEncoder::new(props.pb, nice_len),
            dist_price_count: 0,
            align_price_count: 0,
            dist_slot_prices_size: dist_slot(dict_size - 1) as usize + 1,
            dist_slot_prices: [[0; DIST_SLOTS]; DIST_STATES],
            full_dist_prices: [[0; FULL_DISTANCES]; DIST_STATES],
            align_prices: [0; ALIGN_SIZE],
            read_ahead: -1,
            uncompressed_size: 0,
        }
    }

    fn reset(&mut self) {
        self.model.reset();
        self.state = State::new();
        self.reps = [0; REPS];
        self.match_len_encoder.reset();
        self.rep_len_encoder.reset();
        self.dist_price_count = 0;
        self.align_price_count = 0;
        self.uncompressed_size = (self.uncompressed_size as i64 + self.read_ahead as i64 + 1) as usize;
        self.read_ahead = -1;
    }

    /// Position state of `pos`.
    #[inline]
    pub(crate) fn pos_state(&self, pos: i32) -> usize {
        pos as usize & self.pos_mask
    }

    /// Advance the window one byte and collect the matches there.
    pub(crate) fn get_matches(&mut self, matches: &mut Matches) {
        self.read_ahead += 1;
        self.lz.get_matches(matches);
    }

    /// Advance the window `len` bytes without searching.
    pub(crate) fn skip(&mut self, len: usize) {
        self.read_ahead += len as i32;
        self.lz.skip(len);
    }

    /// Encode the first byte of a stream: always a literal at state 0.
    fn encode_init(&mut self) -> bool {
        debug_assert_eq!(self.read_ahead, -1);
        if !self.lz.has_enough_data(0) {
            return false;
        }

        self.skip(1);
        let state = self.state.value();
        self.rc.encode_bit(&mut self.model.is_match[state][0], 0);
        self.encode_literal(0);
        self.read_ahead -= 1;
        debug_assert_eq!(self.read_ahead, -1);
        self.uncompressed_size += 1;
        true
    }

    fn encode_symbol(&mut self, parser: &mut Parser) -> bool {
        if !self.lz.has_enough_data((self.read_ahead + 1) as usize) {
            return false;
        }

        let (len, symbol) = parser.next_symbol(self);
        debug_assert!(self.read_ahead >= 0);
        let pos_state = self.pos_state(self.lz.get_pos() - self.read_ahead);
        let state = self.state.value();

        match symbol {
            Symbol::Literal => {
                debug_assert_eq!(len, 1);
                self.rc.encode_bit(&mut self.model.is_match[state][pos_state], 0);
                let pos = self.lz.get_pos() - self.read_ahead;
                let index = self
                    .model
                    .literal
                    .subcoder_index(self.lz.get_byte(1 + self.read_ahead as usize), pos as u64);
                self.encode_literal(index);
            }
            Symbol::Rep(rep) => {
                self.rc.encode_bit(&mut self.model.is_match[state][pos_state], 1);
                self.rc.encode_bit(&mut self.model.is_rep[state], 1);
                self.encode_rep_match(rep, len, pos_state);
            }
            Symbol::Match(dist) => {
                self.rc.encode_bit(&mut self.model.is_match[state][pos_state], 1);
                self.rc.encode_bit(&mut self.model.is_rep[state], 0);
                self.encode_match(dist, len, pos_state);
            }
        }

        self.read_ahead -= len as i32;
        self.uncompressed_size += len;
        true
    }

    /// Encode the byte `read_ahead` positions behind the read position
    /// with literal subcoder `index`.
    fn encode_literal(&mut self, index: usize) {
        let read_ahead = self.read_ahead as usize;
        let mut symbol = self.lz.get_byte(read_ahead) as u32 | 0x100;
        let probs = self.model.literal.subcoder_mut(index);

        if self.state.is_literal() {
            loop {
                let bit = (symbol >> 7) & 1;
                self.rc.encode_bit(&mut probs[(symbol >> 8) as usize], bit);
                symbol <<= 1;
                if symbol >= 0x10000 {
                    break;
                }
            }
        } else {
            let mut match_byte = self.lz.get_byte(self.reps[0] as usize + 1 + read_ahead) as u32;
            let mut offset = 0x100;
            loop {
                match_byte <<= 1;
                let match_bit = match_byte & offset;
                let index = offset + match_bit + (symbol >> 8);
                let bit = (symbol >> 7) & 1;
                self.rc.encode_bit(&mut probs[index as usize], bit);
                symbol <<= 1;
                offset &= !(match_byte ^ symbol);
                if symbol >= 0x10000 {
                    break;
                }
            }
        }

        self.state.update_literal();
    }

    fn encode_match(&mut self, dist: u32, len: usize, pos_state: usize) {
        self.state.update_match();
        self.match_len_encoder
            .encode(&mut self.rc, &mut self.model.match_len, len, pos_state);

        let slot = dist_slot(dist);
        self.rc
            .encode_bit_tree(&mut self.model.dist_slots[dist_state(len)], slot);

        if slot >= DIST_MODEL_START {
            let footer_bits = (slot >> 1) - 1;
            let base = (2 | (slot & 1)) << footer_bits;
            let dist_reduced = dist - base;

            if slot < DIST_MODEL_END {
                self.rc
                    .encode_reverse_bit_tree(self.model.dist_special_mut(slot), dist_reduced);
            } else {
                self.rc
                    .encode_direct_bits(dist_reduced >> ALIGN_BITS, footer_bits - ALIGN_BITS);
                self.rc
                    .encode_reverse_bit_tree(&mut self.model.dist_align, dist_reduced & ALIGN_MASK);
                self.align_price_count -= 1;
            }
        }

        self.reps.copy_within(0..REPS - 1, 1);
        self.reps[0] = dist;
        self.dist_price_count -= 1;
    }

    fn encode_rep_match(&mut self, rep: usize, len: usize, pos_state: usize) {
        let state = self.state.value();
        if rep == 0 {
            self.rc.encode_bit(&mut self.model.is_rep0[state], 0);
            self.rc.encode_bit(
                &mut self.model.is_rep0_long[state][pos_state],
                u32::from(len != 1),
            );
        } else {
            self.rc.encode_bit(&mut self.model.is_rep0[state], 1);
            if rep == 1 {
                self.rc.encode_bit(&mut self.model.is_rep1[state], 0);
            } else {
                self.rc.encode_bit(&mut self.model.is_rep1[state], 1);
                self.rc
                    .encode_bit(&mut self.model.is_rep2[state], (rep - 2) as u32);
            }
            self.reps[..=rep].rotate_right(1);
        }

        if len == 1 {
            self.state.update_short_rep();
        } else {
            self.rep_len_encoder
                .encode(&mut self.rc, &mut self.model.rep_len, len, pos_state);
            self.state.update_long_rep();
        }
    }

    /// Price of the is-match bit being 1.
    pub(crate) fn any_match_price(&self, state: State, pos_state: usize) -> u32 {
        bit_price(self.model.is_match[state.value()][pos_state], 1)
    }

    /// Price of a new-distance match, excluding length and distance.
    pub(crate) fn normal_match_price(&self, any_match_price: u32, state: State) -> u32 {
        any_match_price + bit_price(self.model.is_rep[state.value()], 0)
    }

    /// Price of any rep match, excluding which rep and the length.
    pub(crate) fn any_rep_price(&self, any_match_price: u32, state: State) -> u32 {
        any_match_price + bit_price(self.model.is_rep[state.value()], 1)
    }

    pub(crate) fn short_rep_price(&self, any_rep_price: u32, state: State, pos_state: usize) -> u32 {
        let s = state.value();
        any_rep_price
            + bit_price(self.model.is_rep0[s], 0)
            + bit_price(self.model.is_rep0_long[s][pos_state], 0)
    }

    pub(crate) fn long_rep_price(
        &self,
        any_rep_price: u32,
        rep: usize,
        state: State,
        pos_state: usize,
    ) -> u32 {
        let s = state.value();
        let mut price = any_rep_price;
        if rep == 0 {
            price += bit_price(self.model.is_rep0[s], 0)
                + bit_price(self.model.is_rep0_long[s][pos_state], 1);
        } else {
            price += bit_price(self.model.is_rep0[s], 1);
            if rep == 1 {
                price += bit_price(self.model.is_rep1[s], 0);
            } else {
                price += bit_price(self.model.is_rep1[s], 1)
                    + bit_price(self.model.is_rep2[s], (rep - 2) as u32);
            }
        }
        price
    }

    pub(crate) fn long_rep_and_len_price(
        &self,
        rep: usize,
        len: usize,
        state: State,
        pos_state: usize,
    ) -> u32 {
        let any_match_price = self.any_match_price(state, pos_state);
        let any_rep_price = self.any_rep_price(any_match_price, state);
        let long_rep_price = self.long_rep_price(any_rep_price, rep, state, pos_state);
        long_rep_price + self.rep_len_encoder.price(len, pos_state)
    }

    /// Rep match length price.
    #[inline]
    pub(crate) fn rep_len_price(&self, len: usize, pos_state: usize) -> u32 {
        self.rep_len_encoder.price(len, pos_state)
    }

    pub(crate) fn match_and_len_price(
        &self,
        normal_match_price: u32,
        dist: u32,
        len: usize,
        pos_state: usize,
    ) -> u32 {
        let mut price = normal_match_price + self.match_len_encoder.price(len, pos_state);
        let ds = dist_state(len);

        if (dist as usize) < FULL_DISTANCES {
            price += self.full_dist_prices[ds][dist as usize];
        } else {
            let slot = dist_slot(dist) as usize;
            price += self.dist_slot_prices[ds][slot] + self.align_prices[(dist & ALIGN_MASK) as usize];
        }

        price
    }

    /// Price of coding `cur_byte` as a literal at window position `pos`,
    /// is-match bit included.
    pub(crate) fn literal_price(
        &self,
        cur_byte: u8,
        match_byte: u8,
        prev_byte: u8,
        pos: i32,
        state: State,
    ) -> u32 {
        let price = bit_price(self.model.is_match[state.value()][self.pos_state(pos)], 0);
        let index = self.model.literal.subcoder_index(prev_byte, pos as u64);
        let probs = self.model.literal.subcoder(index);

        price
            + if state.is_literal() {
                normal_literal_price(probs, cur_byte as u32)
            } else {
                matched_literal_price(probs, cur_byte as u32, match_byte as u32)
            }
    }

    fn update_dist_prices(&mut self) {
        self.dist_price_count = DIST_PRICE_UPDATE_INTERVAL;

        for ds in 0..DIST_STATES {
            let slot_prices = &mut self.dist_slot_prices[ds];
            for (slot, price) in slot_prices
                .iter_mut()
                .enumerate()
                .take(self.dist_slot_prices_size)
            {
                *price = bit_tree_price(&self.model.dist_slots[ds], slot as u32);
            }

            for slot in DIST_MODEL_END as usize..self.dist_slot_prices_size {
                let count = (slot as u32 >> 1) - 1 - ALIGN_BITS;
                slot_prices[slot] += direct_bits_price(count);
            }

            for dist in 0..DIST_MODEL_START as usize {
                self.full_dist_prices[ds][dist] = slot_prices[dist];
            }
        }

        let mut dist = DIST_MODEL_START;
        for slot in DIST_MODEL_START..DIST_MODEL_END {
            let footer_bits = (slot >> 1) - 1;
            let base = (2 | (slot & 1)) << footer_bits;
            let probs = self.model.dist_special(slot);

            for _ in 0..probs.len() {
                let price = reverse_bit_tree_price(probs, dist - base);
                for ds in 0..DIST_STATES {
                    self.full_dist_prices[ds][dist as usize] =
                        self.dist_slot_prices[ds][slot as usize] + price;
                }
                dist += 1;
            }
        }

        debug_assert_eq!(dist as usize, FULL_DISTANCES);
    }

    fn update_align_prices(&mut self) {
        self.align_price_count = ALIGN_PRICE_UPDATE_INTERVAL;
        for (i, price) in self.align_prices.iter_mut().enumerate() {
            *price = reverse_bit_tree_price(&self.model.dist_align, i as u32);
        }
    }

    /// Refresh whichever price tables are due.
    pub(crate) fn update_prices(&mut self) {
        if self.dist_price_count <= 0 {
            self.update_dist_prices();
        }
        if self.align_price_count <= 0 {
            self.update_align_prices();
        }
        self.match_len_encoder.update_prices(&self.model.match_len);
        self.rep_len_encoder.update_prices(&self.model.rep_len);
    }

    #[cfg(test)]
    pub(crate) fn model(&self) -> &LzmaModel {
        &self.model
    }
}

/// Strategy that picks the next symbol to encode.
pub(crate) trait SymbolParser {
    /// Decide the next symbol at `read_pos - read_ahead`; returns its
    /// length and kind. The parser advances the window through `core` as
    /// far as it needs to look.
    fn next_symbol(&mut self, core: &mut EncoderCore) -> (usize, Symbol);

    /// Forget queued decisions.
    fn reset(&mut self) {}
}

/// The parser selected by [`Mode`].
#[derive(Debug)]
pub(crate) enum Parser {
    Fast(FastParser),
    Normal(Box<NormalParser>),
}

impl SymbolParser for Parser {
    fn next_symbol(&mut self, core: &mut EncoderCore) -> (usize, Symbol) {
        match self {
            Parser::Fast(p) => p.next_symbol(core),
            Parser::Normal(p) => p.next_symbol(core),
        }
    }

    fn reset(&mut self) {
        match self {
            Parser::Fast(p) => p.reset(),
            Parser::Normal(p) => p.reset(),
        }
    }
}

/// Encoder parameters beyond the literal/position properties.
#[derive(Debug, Clone, Copy)]
pub struct EncoderConfig {
    /// Parsing strategy. [`Mode::Uncompressed`] encodes like [`Mode::Fast`].
    pub mode: Mode,
    /// Dictionary size in bytes.
    pub dict_size: u32,
    /// History the caller needs kept before the dictionary, in bytes.
    pub extra_before: u32,
    /// Match length that ends the search early.
    pub nice_len: usize,
    /// Match finder.
    pub match_finder: MatchFinder,
    /// Match finder search depth; 0 picks a default.
    pub depth_limit: usize,
}

/// LZMA encoder: window, model and parser.
#[derive(Debug)]
pub struct LzmaEncoder {
    core: EncoderCore,
    parser: Parser,
}

impl LzmaEncoder {
    /// Create an encoder.
    pub fn new(props: LzmaProperties, config: &EncoderConfig) -> Self {
        let (extra_before, extra_after) = match config.mode {
            Mode::Normal => NormalParser::EXTRA_SIZES,
            Mode::Fast | Mode::Uncompressed => FastParser::EXTRA_SIZES,
        };

        let lz = LzEncoder::new(
            config.dict_size,
            config.extra_before.max(extra_before),
            extra_after,
            config.nice_len,
            MATCH_LEN_MAX,
            config.match_finder,
            config.depth_limit,
        );

        let parser = match config.mode {
            Mode::Normal => Parser::Normal(Box::new(NormalParser::new(config.nice_len))),
            Mode::Fast | Mode::Uncompressed => Parser::Fast(FastParser::new(config.nice_len)),
        };

        debug!(
            mode = ?config.mode,
            dict_size = config.dict_size,
            nice_len = config.nice_len,
            match_finder = ?config.match_finder,
            "created LZMA encoder"
        );

        Self {
            core: EncoderCore::new(lz, props, config.dict_size, config.nice_len),
            parser,
        }
    }

    /// Memory usage in KiB of an encoder with the given settings.
    pub fn memory_usage(mode: Mode, dict_size: u32, extra_before: u32, mf: MatchFinder) -> u64 {
        let parser = match mode {
            Mode::Normal => NormalParser::memory_usage(dict_size, extra_before, mf),
            Mode::Fast | Mode::Uncompressed => FastParser::memory_usage(dict_size, extra_before, mf),
        };
        ENCODER_BASE_MEMORY + parser
    }

    /// The window and match finder.
    pub fn lz(&self) -> &LzEncoder {
        &self.core.lz
    }

    /// Mutable access to the window, for feeding input.
    pub fn lz_mut(&mut self) -> &mut LzEncoder {
        &mut self.core.lz
    }

    /// The range encoder holding the encoded output.
    pub fn rc_mut(&mut self) -> &mut RangeEncoder {
        &mut self.core.rc
    }

    /// Properties used by this encoder.
    pub fn props(&self) -> LzmaProperties {
        self.core.model.props
    }

    /// Reset model, state and reps. Bytes the parser read ahead but did
    /// not encode are counted as consumed.
    pub fn reset(&mut self) {
        self.core.reset();
        self.parser.reset();
    }

    /// Bytes encoded since the last [`reset_uncompressed_size`](Self::reset_uncompressed_size).
    pub fn uncompressed_size(&self) -> usize {
        self.core.uncompressed_size
    }

    /// Start counting encoded bytes from zero.
    pub fn reset_uncompressed_size(&mut self) {
        self.core.uncompressed_size = 0;
    }

    /// Encode everything the window makes available.
    pub fn encode_for_lzma1(&mut self) {
        if !self.core.lz.is_started() && !self.core.encode_init() {
            return;
        }

        while self.core.encode_symbol(&mut self.parser) {}
    }

    /// Encode the end-of-payload marker: a match of length 2 at distance
    /// `u32::MAX`.
    pub fn encode_lzma1_end_marker(&mut self) {
        let core = &mut self.core;
        let pos_state = core.pos_state(core.lz.get_pos() - core.read_ahead);
        let state = core.state.value();
        core.rc.encode_bit(&mut core.model.is_match[state][pos_state], 1);
        core.rc.encode_bit(&mut core.model.is_rep[state], 0);
        core.encode_match(END_MARKER_DIST, MATCH_LEN_MIN, pos_state);
    }

    /// Encode until the chunk is full or the window runs dry. Returns
    /// true when the chunk is full and must be written out.
    pub fn encode_for_lzma2(&mut self) -> bool {
        if !self.core.lz.is_started() && !self.core.encode_init() {
            return false;
        }

        while self.core.uncompressed_size <= LZMA2_UNCOMPRESSED_LIMIT
            && self.core.rc.pending_size() <= LZMA2_COMPRESSED_LIMIT
        {
            if !self.core.encode_symbol(&mut self.parser) {
                return false;
            }
        }

        true
    }
}
