//! LZMA probability models.
//!
//! LZMA uses context-dependent probability models for:
//! - Literal encoding (context = previous byte + position)
//! - Match length encoding
//! - Distance encoding
//! - State machine transitions
//!
//! Every table is a flat array of 11-bit probabilities owned by
//! [`LzmaModel`]; the encoder and decoder share the layout.

use crate::range_coder::PROB_INIT;

/// Default number of literal context bits.
pub const LC_DEFAULT: u32 = 3;

/// Default number of literal position bits.
pub const LP_DEFAULT: u32 = 0;

/// Default number of position bits.
pub const PB_DEFAULT: u32 = 2;

/// Largest `lc` a raw LZMA stream may use.
pub const LC_MAX: u32 = 8;

/// Largest `lp` a raw LZMA stream may use.
pub const LP_MAX: u32 = 4;

/// Maximum of `lc + lp` accepted by LZMA2.
pub const LC_LP_MAX: u32 = 4;

/// Maximum number of position states.
pub const POS_STATES_MAX: usize = 1 << 4;

/// Number of states in the LZMA state machine.
pub const NUM_STATES: usize = 12;

/// States below this value follow a literal.
pub const LIT_STATES: u8 = 7;

/// Number of low length symbols.
pub const LEN_LOW_SYMBOLS: usize = 1 << 3;
/// Number of mid length symbols.
pub const LEN_MID_SYMBOLS: usize = 1 << 3;
/// Number of high length symbols.
pub const LEN_HIGH_SYMBOLS: usize = 1 << 8;

/// Number of distinct length symbols.
pub const LEN_SYMBOLS: usize = LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS + LEN_HIGH_SYMBOLS;

/// Minimum match length.
pub const MATCH_LEN_MIN: usize = 2;

/// Maximum match length.
pub const MATCH_LEN_MAX: usize = MATCH_LEN_MIN + LEN_SYMBOLS - 1;

/// Number of rep distances kept by the coder.
pub const REPS: usize = 4;

/// Number of length contexts for distance slots.
pub const DIST_STATES: usize = 4;

/// Number of distance slots.
pub const DIST_SLOTS: usize = 64;

/// First slot coded with extra bits.
pub const DIST_MODEL_START: u32 = 4;

/// First slot coded with direct bits and the align tree.
pub const DIST_MODEL_END: u32 = 14;

/// Distances below this are priced exactly.
pub const FULL_DISTANCES: usize = 1 << (DIST_MODEL_END / 2);

/// Number of alignment bits for distance encoding.
pub const ALIGN_BITS: u32 = 4;
/// Size of alignment table.
pub const ALIGN_SIZE: usize = 1 << ALIGN_BITS;
/// Mask of the alignment bits.
pub const ALIGN_MASK: u32 = ALIGN_SIZE as u32 - 1;

/// Probabilities per literal subcoder.
pub const LITERAL_CODER_SIZE: usize = 0x300;

/// Start of each slot's reverse tree inside [`LzmaModel::dist_special`].
/// Slot `s` owns `1 << ((s >> 1) - 1)` entries.
const DIST_SPECIAL_OFFSETS: [usize; (DIST_MODEL_END - DIST_MODEL_START) as usize + 1] = {
    let mut offsets = [0usize; (DIST_MODEL_END - DIST_MODEL_START) as usize + 1];
    let mut slot = DIST_MODEL_START;
    while slot < DIST_MODEL_END {
        let i = (slot - DIST_MODEL_START) as usize;
        offsets[i + 1] = offsets[i] + (1 << ((slot >> 1) - 1));
        slot += 1;
    }
    offsets
};

/// Total entries of the flattened distance reverse trees.
pub const DIST_SPECIAL_SIZE: usize = DIST_SPECIAL_OFFSETS[DIST_SPECIAL_OFFSETS.len() - 1];

/// Length context used to pick a distance slot tree.
#[inline]
pub fn dist_state(len: usize) -> usize {
    if len < DIST_STATES + MATCH_LEN_MIN {
        len - MATCH_LEN_MIN
    } else {
        DIST_STATES - 1
    }
}

/// LZMA state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State(u8);

impl State {
    /// Initial state.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Get state value.
    #[inline]
    pub fn value(self) -> usize {
        self.0 as usize
    }

    /// Check if state represents a literal.
    #[inline]
    pub fn is_literal(self) -> bool {
        self.0 < LIT_STATES
    }

    /// Update state after literal.
    #[inline]
    pub fn update_literal(&mut self) {
        self.0 = match self.0 {
            0..=3 => 0,
            4..=9 => self.0 - 3,
            _ => self.0 - 6,
        };
    }

    /// Update state after match.
    #[inline]
    pub fn update_match(&mut self) {
        self.0 = if self.0 < LIT_STATES { 7 } else { 10 };
    }

    /// Update state after long rep.
    #[inline]
    pub fn update_long_rep(&mut self) {
        self.0 = if self.0 < LIT_STATES { 8 } else { 11 };
    }

    /// Update state after short rep.
    #[inline]
    pub fn update_short_rep(&mut self) {
        self.0 = if self.0 < LIT_STATES { 9 } else { 11 };
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// LZMA properties (lc, lp, pb).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LzmaProperties {
    /// Literal context bits.
    pub lc: u32,
    /// Literal position bits.
    pub lp: u32,
    /// Position bits.
    pub pb: u32,
}

impl LzmaProperties {
    /// Create new properties.
    pub fn new(lc: u32, lp: u32, pb: u32) -> Self {
        Self { lc, lp, pb }
    }

    /// Parse from property byte (`(pb * 5 + lp) * 9 + lc`).
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte > (4 * 5 + 4) * 9 + 8 {
            return None;
        }
        let pb = byte as u32 / 45;
        let remaining = byte as u32 - pb * 45;
        let lp = remaining / 9;
        let lc = remaining - lp * 9;

        Some(Self { lc, lp, pb })
    }

    /// Parse a property byte found in an LZMA2 chunk header.
    pub fn from_byte_lzma2(byte: u8) -> Option<Self> {
        Self::from_byte(byte).filter(|p| p.lc + p.lp <= LC_LP_MAX)
    }

    /// Encode to property byte.
    pub fn to_byte(&self) -> u8 {
        ((self.pb * 5 + self.lp) * 9 + self.lc) as u8
    }

    /// Get number of literal subcoders.
    pub fn num_lit_states(&self) -> usize {
        1 << (self.lc + self.lp)
    }

    /// Get number of position states.
    pub fn num_pos_states(&self) -> usize {
        1 << self.pb
    }

    /// Mask selecting the position state from a position.
    pub fn pos_mask(&self) -> usize {
        self.num_pos_states() - 1
    }
}

impl Default for LzmaProperties {
    fn default() -> Self {
        Self {
            lc: LC_DEFAULT,
            lp: LP_DEFAULT,
            pb: PB_DEFAULT,
        }
    }
}

/// Length probabilities, shared layout for match and rep lengths.
#[derive(Debug, Clone)]
pub struct LengthProbs {
    /// Choice bits: low vs rest, then mid vs high.
    pub choice: [u16; 2],
    /// Low length trees (per position state).
    pub low: [[u16; LEN_LOW_SYMBOLS]; POS_STATES_MAX],
    /// Mid length trees (per position state).
    pub mid: [[u16; LEN_MID_SYMBOLS]; POS_STATES_MAX],
    /// High length tree (shared).
    pub high: [u16; LEN_HIGH_SYMBOLS],
}

impl LengthProbs {
    /// Create a new length model.
    pub fn new() -> Self {
        Self {
            choice: [PROB_INIT; 2],
            low: [[PROB_INIT; LEN_LOW_SYMBOLS]; POS_STATES_MAX],
            mid: [[PROB_INIT; LEN_MID_SYMBOLS]; POS_STATES_MAX],
            high: [PROB_INIT; LEN_HIGH_SYMBOLS],
        }
    }

    /// Reset the model.
    pub fn reset(&mut self) {
        self.choice.fill(PROB_INIT);
        for arr in &mut self.low {
            arr.fill(PROB_INIT);
        }
        for arr in &mut self.mid {
            arr.fill(PROB_INIT);
        }
        self.high.fill(PROB_INIT);
    }

    fn iter(&self) -> impl Iterator<Item = &u16> {
        self.choice
            .iter()
            .chain(self.low.iter().flatten())
            .chain(self.mid.iter().flatten())
            .chain(self.high.iter())
    }
}

impl Default for LengthProbs {
    fn default() -> Self {
        Self::new()
    }
}

/// Literal probabilities: `1 << (lc + lp)` subcoders of 0x300 entries,
/// stored back to back.
#[derive(Debug, Clone)]
pub struct LiteralProbs {
    probs: Vec<u16>,
    lc: u32,
    lp_mask: u64,
}

impl LiteralProbs {
    /// Create a new literal model.
    pub fn new(lc: u32, lp: u32) -> Self {
        Self {
            probs: vec![PROB_INIT; LITERAL_CODER_SIZE << (lc + lp)],
            lc,
            lp_mask: (1u64 << lp) - 1,
        }
    }

    /// Reset the model.
    pub fn reset(&mut self) {
        self.probs.fill(PROB_INIT);
    }

    /// Index of the subcoder for a literal at `pos` following `prev_byte`.
    #[inline]
    pub fn subcoder_index(&self, prev_byte: u8, pos: u64) -> usize {
        let low = (prev_byte as u32 >> (8 - self.lc)) as usize;
        let high = ((pos & self.lp_mask) as usize) << self.lc;
        low + high
    }

    /// Probabilities of subcoder `index`.
    #[inline]
    pub fn subcoder(&self, index: usize) -> &[u16] {
        &self.probs[index * LITERAL_CODER_SIZE..(index + 1) * LITERAL_CODER_SIZE]
    }

    /// Mutable probabilities of subcoder `index`.
    #[inline]
    pub fn subcoder_mut(&mut self, index: usize) -> &mut [u16] {
        &mut self.probs[index * LITERAL_CODER_SIZE..(index + 1) * LITERAL_CODER_SIZE]
    }
}

/// Complete LZMA model containing all probability tables.
#[derive(Debug, Clone)]
pub struct LzmaModel {
    /// LZMA properties.
    pub props: LzmaProperties,

    /// Is-match probabilities.
    pub is_match: [[u16; POS_STATES_MAX]; NUM_STATES],
    /// Is-rep probabilities.
    pub is_rep: [u16; NUM_STATES],
    /// Is-rep0 probabilities.
    pub is_rep0: [u16; NUM_STATES],
    /// Is-rep1 probabilities.
    pub is_rep1: [u16; NUM_STATES],
    /// Is-rep2 probabilities.
    pub is_rep2: [u16; NUM_STATES],
    /// Is-rep0-long probabilities.
    pub is_rep0_long: [[u16; POS_STATES_MAX]; NUM_STATES],

    /// Distance slot trees (per length state).
    pub dist_slots: [[u16; DIST_SLOTS]; DIST_STATES],
    /// Reverse trees of slots 4..14, flattened.
    pub dist_special: [u16; DIST_SPECIAL_SIZE],
    /// Alignment tree.
    pub dist_align: [u16; ALIGN_SIZE],

    /// Match length model.
    pub match_len: LengthProbs,
    /// Rep match length model.
    pub rep_len: LengthProbs,

    /// Literal model.
    pub literal: LiteralProbs,
}

impl LzmaModel {
    /// Create a new LZMA model with the given properties.
    pub fn new(props: LzmaProperties) -> Self {
        Self {
            props,
            is_match: [[PROB_INIT; POS_STATES_MAX]; NUM_STATES],
            is_rep: [PROB_INIT; NUM_STATES],
            is_rep0: [PROB_INIT; NUM_STATES],
            is_rep1: [PROB_INIT; NUM_STATES],
            is_rep2: [PROB_INIT; NUM_STATES],
            is_rep0_long: [[PROB_INIT; POS_STATES_MAX]; NUM_STATES],
            dist_slots: [[PROB_INIT; DIST_SLOTS]; DIST_STATES],
            dist_special: [PROB_INIT; DIST_SPECIAL_SIZE],
            dist_align: [PROB_INIT; ALIGN_SIZE],
            match_len: LengthProbs::new(),
            rep_len: LengthProbs::new(),
            literal: LiteralProbs::new(props.lc, props.lp),
        }
    }

    /// Reset all probabilities to initial values.
    pub fn reset(&mut self) {
        for state in &mut self.is_match {
            state.fill(PROB_INIT);
        }
        self.is_rep.fill(PROB_INIT);
        self.is_rep0.fill(PROB_INIT);
        self.is_rep1.fill(PROB_INIT);
        self.is_rep2.fill(PROB_INIT);
        for state in &mut self.is_rep0_long {
            state.fill(PROB_INIT);
        }
        for slots in &mut self.dist_slots {
            slots.fill(PROB_INIT);
        }
        self.dist_special.fill(PROB_INIT);
        self.dist_align.fill(PROB_INIT);
        self.match_len.reset();
        self.rep_len.reset();
        self.literal.reset();
    }

    /// Reverse tree of a distance slot in `DIST_MODEL_START..DIST_MODEL_END`.
    #[inline]
    pub fn dist_special(&self, slot: u32) -> &[u16] {
        let i = (slot - DIST_MODEL_START) as usize;
        &self.dist_special[DIST_SPECIAL_OFFSETS[i]..DIST_SPECIAL_OFFSETS[i + 1]]
    }

    /// Mutable reverse tree of a distance slot.
    #[inline]
    pub fn dist_special_mut(&mut self, slot: u32) -> &mut [u16] {
        let i = (slot - DIST_MODEL_START) as usize;
        &mut self.dist_special[DIST_SPECIAL_OFFSETS[i]..DIST_SPECIAL_OFFSETS[i + 1]]
    }

    /// Whether every probability lies within `1..2048`.
    #[cfg(test)]
    pub(crate) fn probs_in_range(&self) -> bool {
        self.is_match
            .iter()
            .flatten()
            .chain(&self.is_rep)
            .chain(&self.is_rep0)
            .chain(&self.is_rep1)
            .chain(&self.is_rep2)
            .chain(self.is_rep0_long.iter().flatten())
            .chain(self.dist_slots.iter().flatten())
            .chain(&self.dist_special)
            .chain(&self.dist_align)
            .chain(self.match_len.iter())
            .chain(self.rep_len.iter())
            .chain(&self.literal.probs)
            .all(|&p| (1..2048).contains(&p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut state = State::new();
        assert!(state.is_literal());

        state.update_match();
        assert!(!state.is_literal());
        assert_eq!(state.value(), 7);

        state.update_literal();
        assert!(state.is_literal());
        assert_eq!(state.value(), 4);

        state.update_match();
        assert_eq!(state.value(), 7);
        state.update_match();
        assert_eq!(state.value(), 10);
        state.update_literal();
        assert_eq!(state.value(), 4);
    }

    #[test]
    fn test_literal_transition_table() {
        let expected = [0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 4, 5];
        for (s, &next) in expected.iter().enumerate() {
            let mut state = State(s as u8);
            state.update_literal();
            assert_eq!(state.value(), next, "literal after state {s}");
        }
    }

    #[test]
    fn test_rep_transitions() {
        let mut state = State::new();
        state.update_long_rep();
        assert_eq!(state.value(), 8);
        state.update_short_rep();
        assert_eq!(state.value(), 11);

        let mut state = State::new();
        state.update_short_rep();
        assert_eq!(state.value(), 9);
    }

    #[test]
    fn test_properties_encoding() {
        let props = LzmaProperties::new(3, 0, 2);
        let byte = props.to_byte();
        assert_eq!(byte, 0x5D);
        let decoded = LzmaProperties::from_byte(byte).unwrap();
        assert_eq!(decoded, props);

        assert!(LzmaProperties::from_byte(225).is_none());
        assert_eq!(LzmaProperties::from_byte(224).unwrap(), LzmaProperties::new(8, 4, 4));
        assert!(LzmaProperties::from_byte_lzma2(LzmaProperties::new(3, 2, 0).to_byte()).is_none());
        assert!(LzmaProperties::from_byte_lzma2(LzmaProperties::new(4, 0, 4).to_byte()).is_some());
    }

    #[test]
    fn test_default_properties() {
        let props = LzmaProperties::default();
        assert_eq!(props.lc, 3);
        assert_eq!(props.lp, 0);
        assert_eq!(props.pb, 2);
        assert_eq!(props.pos_mask(), 3);
    }

    #[test]
    fn test_dist_special_layout() {
        assert_eq!(DIST_SPECIAL_SIZE, 124);
        let model = LzmaModel::new(LzmaProperties::default());
        assert_eq!(model.dist_special(4).len(), 2);
        assert_eq!(model.dist_special(7).len(), 4);
        assert_eq!(model.dist_special(13).len(), 32);
    }

    #[test]
    fn test_dist_state() {
        assert_eq!(dist_state(2), 0);
        assert_eq!(dist_state(5), 3);
        assert_eq!(dist_state(273), 3);
    }

    #[test]
    fn test_literal_subcoders() {
        let lits = LiteralProbs::new(3, 1);
        assert_eq!(lits.subcoder_index(0xFF, 0), 7);
        assert_eq!(lits.subcoder_index(0xFF, 1), 15);
        assert_eq!(lits.subcoder(15).len(), LITERAL_CODER_SIZE);

        let lits = LiteralProbs::new(0, 0);
        assert_eq!(lits.subcoder_index(0xAB, 12345), 0);
    }

    #[test]
    fn test_model_creation() {
        let model = LzmaModel::new(LzmaProperties::default());
        assert_eq!(model.is_match.len(), NUM_STATES);
        assert_eq!(MATCH_LEN_MAX, 273);
        assert_eq!(FULL_DISTANCES, 128);
        assert!(model.probs_in_range());
    }
}
