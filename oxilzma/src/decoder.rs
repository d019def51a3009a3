//! LZMA symbol decoder.
//!
//! Decodes literals, matches and rep matches from a range decoder into an
//! [`LzDecoder`] dictionary until the dictionary's output limit is reached.
//! The same decoder serves raw LZMA1 streams and LZMA2 chunks; only the
//! range decoder's byte source differs.

use crate::lz::LzDecoder;
use crate::model::{
    ALIGN_BITS, DIST_MODEL_END, DIST_MODEL_START, LEN_LOW_SYMBOLS, LEN_MID_SYMBOLS, LengthProbs,
    LzmaModel, LzmaProperties, MATCH_LEN_MIN, REPS, State, dist_state,
};
use crate::range_coder::{ByteSource, RangeDecoder};
use oxilzma_core::error::Result;

/// Distance used by the end-of-payload marker.
pub const END_MARKER_DIST: u32 = u32::MAX;

/// Decode a length.
fn decode_length<S: ByteSource>(
    rc: &mut RangeDecoder<S>,
    len_probs: &mut LengthProbs,
    pos_state: usize,
) -> Result<usize> {
    if rc.decode_bit(&mut len_probs.choice[0])? == 0 {
        // Low length (2-9)
        let len = rc.decode_bit_tree(&mut len_probs.low[pos_state])?;
        Ok(len as usize + MATCH_LEN_MIN)
    } else if rc.decode_bit(&mut len_probs.choice[1])? == 0 {
        // Mid length (10-17)
        let len = rc.decode_bit_tree(&mut len_probs.mid[pos_state])?;
        Ok(len as usize + MATCH_LEN_MIN + LEN_LOW_SYMBOLS)
    } else {
        // High length (18-273)
        let len = rc.decode_bit_tree(&mut len_probs.high)?;
        Ok(len as usize + MATCH_LEN_MIN + LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS)
    }
}

/// LZMA decoder state: probabilities, state machine and rep distances.
#[derive(Debug, Clone)]
pub struct LzmaDecoder {
    /// Probability tables.
    model: LzmaModel,
    /// Current state.
    state: State,
    /// Rep distances (zero based).
    reps: [u32; REPS],
}

impl LzmaDecoder {
    /// Create a decoder for the given properties.
    pub fn new(props: LzmaProperties) -> Self {
        Self {
            model: LzmaModel::new(props),
            state: State::new(),
            reps: [0; REPS],
        }
    }

    /// Properties this decoder was created with.
    pub fn props(&self) -> LzmaProperties {
        self.model.props
    }

    /// Reset probabilities, state and rep distances.
    pub fn reset(&mut self) {
        self.model.reset();
        self.state = State::new();
        self.reps = [0; REPS];
    }

    /// Whether the last match decoded was the end-of-payload marker.
    pub fn end_marker_detected(&self) -> bool {
        self.reps[0] == END_MARKER_DIST
    }

    /// Decode until the dictionary's limit is reached.
    ///
    /// A match with an impossible distance, including the end marker, is
    /// reported as corruption; LZMA1 readers check
    /// [`end_marker_detected`](Self::end_marker_detected) to tell the two apart.
    pub fn decode<S: ByteSource>(
        &mut self,
        lz: &mut LzDecoder,
        rc: &mut RangeDecoder<S>,
    ) -> Result<()> {
        lz.repeat_pending()?;

        let pos_mask = self.model.props.pos_mask();
        while lz.has_space() {
            let pos_state = lz.pos() & pos_mask;
            let state = self.state.value();

            if rc.decode_bit(&mut self.model.is_match[state][pos_state])? == 0 {
                self.decode_literal(lz, rc)?;
            } else {
                let len = if rc.decode_bit(&mut self.model.is_rep[state])? == 0 {
                    self.decode_match(rc, pos_state)?
                } else {
                    self.decode_rep_match(rc, pos_state)?
                };
                lz.repeat(self.reps[0], len)?;
            }
        }

        rc.normalize()
    }

    /// Decode a literal byte into the dictionary.
    fn decode_literal<S: ByteSource>(
        &mut self,
        lz: &mut LzDecoder,
        rc: &mut RangeDecoder<S>,
    ) -> Result<()> {
        let index = self
            .model
            .literal
            .subcoder_index(lz.get_byte(0), lz.pos() as u64);
        let probs = self.model.literal.subcoder_mut(index);
        let mut symbol = 1usize;

        if self.state.is_literal() {
            while symbol < 0x100 {
                symbol = (symbol << 1) | rc.decode_bit(&mut probs[symbol])? as usize;
            }
        } else {
            // The byte at rep0 predicts the literal until the first
            // mismatching bit.
            let mut match_byte = lz.get_byte(self.reps[0] as usize) as usize;
            let mut offset = 0x100usize;
            while symbol < 0x100 {
                match_byte <<= 1;
                let match_bit = match_byte & offset;
                let bit = rc.decode_bit(&mut probs[offset + match_bit + symbol])? as usize;
                symbol = (symbol << 1) | bit;
                offset &= 0usize.wrapping_sub(bit) ^ !match_bit;
            }
        }

        lz.put_byte(symbol as u8);
        self.state.update_literal();
        Ok(())
    }

    /// Decode a match with a new distance; returns its length.
    fn decode_match<S: ByteSource>(
        &mut self,
        rc: &mut RangeDecoder<S>,
        pos_state: usize,
    ) -> Result<usize> {
        self.state.update_match();
        self.reps.copy_within(0..3, 1);

        let len = decode_length(rc, &mut self.model.match_len, pos_state)?;
        let slot = rc.decode_bit_tree(&mut self.model.dist_slots[dist_state(len)])?;

        self.reps[0] = if slot < DIST_MODEL_START {
            slot
        } else {
            let footer_bits = (slot >> 1) - 1;
            let base = (2 | (slot & 1)) << footer_bits;

            if slot < DIST_MODEL_END {
                base | rc.decode_reverse_bit_tree(self.model.dist_special_mut(slot))?
            } else {
                base | rc.decode_direct_bits(footer_bits - ALIGN_BITS)? << ALIGN_BITS
                    | rc.decode_reverse_bit_tree(&mut self.model.dist_align)?
            }
        };

        Ok(len)
    }

    /// Decode a rep match; returns its length (1 for a short rep).
    fn decode_rep_match<S: ByteSource>(
        &mut self,
        rc: &mut RangeDecoder<S>,
        pos_state: usize,
    ) -> Result<usize> {
        let state = self.state.value();

        if rc.decode_bit(&mut self.model.is_rep0[state])? == 0 {
            if rc.decode_bit(&mut self.model.is_rep0_long[state][pos_state])? == 0 {
                self.state.update_short_rep();
                return Ok(1);
            }
        } else {
            let rep_index = if rc.decode_bit(&mut self.model.is_rep1[state])? == 0 {
                1
            } else if rc.decode_bit(&mut self.model.is_rep2[state])? == 0 {
                2
            } else {
                3
            };
            // Move the chosen distance to the front.
            self.reps[..=rep_index].rotate_right(1);
        }

        self.state.update_long_rep();
        decode_length(rc, &mut self.model.rep_len, pos_state)
    }

    #[cfg(test)]
    pub(crate) fn model(&self) -> &LzmaModel {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_coder::ChunkBuffer;
    use std::io::Cursor;

    fn chunk(bytes: &[u8]) -> RangeDecoder<ChunkBuffer> {
        let mut rc = RangeDecoder::new_chunked(1 << 16);
        rc.prepare_input_buffer(&mut Cursor::new(bytes), bytes.len())
            .unwrap();
        rc
    }

    #[test]
    fn test_decoder_creation() {
        let decoder = LzmaDecoder::new(LzmaProperties::default());
        assert_eq!(decoder.props(), LzmaProperties::default());
        assert!(!decoder.end_marker_detected());
    }

    #[test]
    fn test_zero_code_decodes_literals() {
        // A code of zero always takes the 0 branch: literal 0x00 forever.
        let mut rc = chunk(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let mut lz = LzDecoder::new(4096, None);
        let mut decoder = LzmaDecoder::new(LzmaProperties::default());

        lz.set_limit(4);
        decoder.decode(&mut lz, &mut rc).unwrap();
        let mut out = [0xFFu8; 4];
        assert_eq!(lz.flush(&mut out), 4);
        assert_eq!(out, [0; 4]);
        assert!(decoder.model().probs_in_range());
    }

    #[test]
    fn test_rep_rotation() {
        let mut reps = [10u32, 20, 30, 40];
        reps[..=2].rotate_right(1);
        assert_eq!(reps, [30, 10, 20, 40]);
        reps[..=3].rotate_right(1);
        assert_eq!(reps, [40, 30, 10, 20]);
    }
}
