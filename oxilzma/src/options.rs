//! Encoder options, presets and memory estimates.

use crate::encoder::LzmaEncoder;
use crate::lzma2::{COMPRESSED_SIZE_MAX, props_from_dict_size};
use crate::model::{
    LC_DEFAULT, LC_LP_MAX, LITERAL_CODER_SIZE, LP_DEFAULT, LzmaProperties, MATCH_LEN_MAX,
    PB_DEFAULT,
};
use oxilzma_core::error::{LzmaError, Result};
use oxilzma_core::traits::MemoryUsage;

/// Smallest accepted dictionary size.
pub const DICT_SIZE_MIN: u32 = 4096;

/// Largest dictionary size accepted for encoding (768 MiB).
pub const DICT_SIZE_MAX: u32 = 768 << 20;

/// Shortest accepted nice length.
pub const NICE_LEN_MIN: usize = 8;

/// Longest accepted nice length.
pub const NICE_LEN_MAX: usize = MATCH_LEN_MAX;

/// Largest accepted position bits.
pub const PB_MAX: u32 = 4;

/// Fixed overhead of an LZMA2 writer in KiB.
const LZMA2_WRITER_BASE_MEMORY: u64 = 70;

/// How the encoder picks symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Greedy parsing.
    Fast,
    /// Price-driven optimal parsing.
    Normal,
    /// No compression; LZMA2 only.
    Uncompressed,
}

/// Match finder used by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MatchFinder {
    /// Hash chain over 2, 3 and 4 byte hashes.
    Hc4,
    /// Binary tree over 2, 3 and 4 byte hashes.
    Bt4,
}

/// Preset dictionary sizes.
const PRESET_DICT_SIZES: [u32; 10] = [
    1 << 18, // 0: 256 KiB
    1 << 20, // 1: 1 MiB
    1 << 21, // 2: 2 MiB
    1 << 22, // 3: 4 MiB
    1 << 22, // 4: 4 MiB
    1 << 23, // 5: 8 MiB
    1 << 23, // 6: 8 MiB
    1 << 24, // 7: 16 MiB
    1 << 25, // 8: 32 MiB
    1 << 26, // 9: 64 MiB
];

/// Search depth of the fast presets 0-3.
const PRESET_DEPTH_LIMITS: [usize; 4] = [4, 8, 24, 48];

/// Compression level: a clamped preset number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LzmaLevel(u8);

impl LzmaLevel {
    /// Fastest compression (level 0).
    pub const FAST: Self = Self(0);
    /// Default compression (level 6).
    pub const DEFAULT: Self = Self(6);
    /// Best compression (level 9).
    pub const BEST: Self = Self(9);

    /// Create a new compression level.
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }

    /// Get the dictionary size for this level.
    pub fn dict_size(&self) -> u32 {
        PRESET_DICT_SIZES[self.0 as usize]
    }

    /// Encoder options of this level's preset.
    pub fn options(&self) -> LzmaOptions {
        LzmaOptions::preset_unchecked(self.0 as usize)
    }
}

impl Default for LzmaLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Encoder options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LzmaOptions {
    /// Dictionary size in bytes.
    pub dict_size: u32,
    /// Literal context bits.
    pub lc: u32,
    /// Literal position bits.
    pub lp: u32,
    /// Position bits.
    pub pb: u32,
    /// Parsing strategy.
    pub mode: Mode,
    /// Match length that ends the search early.
    pub nice_len: usize,
    /// Match finder.
    pub match_finder: MatchFinder,
    /// Match finder search depth; 0 picks one from `nice_len`.
    pub depth_limit: usize,
    /// Bytes both sides know before the stream starts.
    pub preset_dict: Option<Vec<u8>>,
}

impl Default for LzmaOptions {
    fn default() -> Self {
        LzmaLevel::DEFAULT.options()
    }
}

impl LzmaOptions {
    /// Options of the default preset (6).
    pub fn new() -> Self {
        Self::default()
    }

    /// Options of preset `preset` (0-9).
    pub fn from_preset(preset: u32) -> Result<Self> {
        if preset > 9 {
            return Err(LzmaError::unsupported(format!("unsupported preset: {preset}")));
        }
        Ok(Self::preset_unchecked(preset as usize))
    }

    fn preset_unchecked(preset: usize) -> Self {
        let (mode, match_finder, nice_len, depth_limit) = if preset <= 3 {
            let nice_len = if preset <= 1 { 128 } else { NICE_LEN_MAX };
            (Mode::Fast, MatchFinder::Hc4, nice_len, PRESET_DEPTH_LIMITS[preset])
        } else {
            let nice_len = match preset {
                4 => 16,
                5 => 32,
                _ => 64,
            };
            (Mode::Normal, MatchFinder::Bt4, nice_len, 0)
        };

        Self {
            dict_size: PRESET_DICT_SIZES[preset],
            lc: LC_DEFAULT,
            lp: LP_DEFAULT,
            pb: PB_DEFAULT,
            mode,
            nice_len,
            match_finder,
            depth_limit,
            preset_dict: None,
        }
    }

    /// Set the dictionary size.
    #[must_use]
    pub fn dict_size(mut self, dict_size: u32) -> Self {
        self.dict_size = dict_size;
        self
    }

    /// Set literal context and position bits.
    #[must_use]
    pub fn lc_lp(mut self, lc: u32, lp: u32) -> Self {
        self.lc = lc;
        self.lp = lp;
        self
    }

    /// Set position bits.
    #[must_use]
    pub fn pb(mut self, pb: u32) -> Self {
        self.pb = pb;
        self
    }

    /// Set the parsing strategy.
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the nice length.
    #[must_use]
    pub fn nice_len(mut self, nice_len: usize) -> Self {
        self.nice_len = nice_len;
        self
    }

    /// Set the match finder.
    #[must_use]
    pub fn match_finder(mut self, match_finder: MatchFinder) -> Self {
        self.match_finder = match_finder;
        self
    }

    /// Set the match finder search depth; 0 picks a default.
    #[must_use]
    pub fn depth_limit(mut self, depth_limit: usize) -> Self {
        self.depth_limit = depth_limit;
        self
    }

    /// Set the preset dictionary.
    #[must_use]
    pub fn preset_dict(mut self, dict: impl Into<Vec<u8>>) -> Self {
        self.preset_dict = Some(dict.into());
        self
    }

    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<()> {
        if !(DICT_SIZE_MIN..=DICT_SIZE_MAX).contains(&self.dict_size) {
            return Err(LzmaError::unsupported(format!(
                "dictionary size {} is outside {DICT_SIZE_MIN}..={DICT_SIZE_MAX}",
                self.dict_size
            )));
        }
        if self.lc > LC_LP_MAX || self.lp > LC_LP_MAX || self.lc + self.lp > LC_LP_MAX {
            return Err(LzmaError::unsupported(format!(
                "lc + lp must not exceed {LC_LP_MAX} (lc = {}, lp = {})",
                self.lc, self.lp
            )));
        }
        if self.pb > PB_MAX {
            return Err(LzmaError::unsupported(format!("pb {} exceeds {PB_MAX}", self.pb)));
        }
        if !(NICE_LEN_MIN..=NICE_LEN_MAX).contains(&self.nice_len) {
            return Err(LzmaError::unsupported(format!(
                "nice length {} is outside {NICE_LEN_MIN}..={NICE_LEN_MAX}",
                self.nice_len
            )));
        }
        Ok(())
    }

    /// Literal and position properties.
    pub fn props(&self) -> LzmaProperties {
        LzmaProperties::new(self.lc, self.lp, self.pb)
    }

    /// The one-byte LZMA2 filter property: the encoded dictionary size.
    pub fn filter_props(&self) -> u8 {
        match self.mode {
            Mode::Uncompressed => 0,
            _ => props_from_dict_size(self.dict_size),
        }
    }

    /// Memory usage in KiB of an LZMA2 writer with these options.
    pub fn encoder_memory_usage(&self) -> u64 {
        encoder_memory_usage(self.dict_size, self.lc, self.lp, self.match_finder, self.mode)
    }
}

impl MemoryUsage for LzmaOptions {
    fn memory_usage_kib(&self) -> u64 {
        self.encoder_memory_usage()
    }
}

/// History an LZMA2 writer keeps beyond the dictionary so that a whole
/// chunk can still be stored uncompressed.
pub(crate) fn lzma2_extra_before(dict_size: u32) -> u32 {
    (COMPRESSED_SIZE_MAX as u32).saturating_sub(dict_size)
}

/// Memory usage in KiB of the literal probabilities.
pub(crate) fn literal_memory_usage(lc: u32, lp: u32) -> u64 {
    ((2 * LITERAL_CODER_SIZE as u64) << (lc + lp)) / 1024
}

/// Memory usage in KiB of an LZMA2 writer.
pub fn encoder_memory_usage(dict_size: u32, lc: u32, lp: u32, mf: MatchFinder, mode: Mode) -> u64 {
    if mode == Mode::Uncompressed {
        return LZMA2_WRITER_BASE_MEMORY;
    }

    LZMA2_WRITER_BASE_MEMORY
        + literal_memory_usage(lc, lp)
        + LzmaEncoder::memory_usage(mode, dict_size, lzma2_extra_before(dict_size), mf)
}

/// Dictionary size an LZMA2 reader allocates for `dict_size`.
pub(crate) fn lzma2_reader_dict_size(dict_size: u32) -> u32 {
    dict_size.saturating_add(15) & !15
}

/// Dictionary size an LZMA1 reader allocates for `dict_size`.
pub(crate) fn lzma_reader_dict_size(dict_size: u32) -> u32 {
    dict_size.max(DICT_SIZE_MIN).saturating_add(15) & !15
}

/// Memory usage in KiB of an LZMA2 reader.
pub fn lzma2_decoder_memory_usage(dict_size: u32) -> u64 {
    40 + (COMPRESSED_SIZE_MAX as u64) / 1024 + lzma2_reader_dict_size(dict_size) as u64 / 1024
}

/// Memory usage in KiB of an LZMA1 reader.
pub fn lzma_decoder_memory_usage(dict_size: u32, lc: u32, lp: u32) -> u64 {
    10 + lzma_reader_dict_size(dict_size) as u64 / 1024 + literal_memory_usage(lc, lp)
}

/// Fail with `MemoryLimitExceeded` when `needed_kib` is above `limit_kib`.
pub(crate) fn check_memory_limit(needed_kib: u64, limit_kib: Option<u64>) -> Result<()> {
    match limit_kib {
        Some(limit) if needed_kib > limit => Err(LzmaError::memory_limit(needed_kib, limit)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level() {
        assert_eq!(LzmaLevel::FAST.level(), 0);
        assert_eq!(LzmaLevel::DEFAULT.level(), 6);
        assert_eq!(LzmaLevel::BEST.level(), 9);
        assert_eq!(LzmaLevel::default(), LzmaLevel::DEFAULT);
    }

    #[test]
    fn test_level_clamp() {
        assert_eq!(LzmaLevel::new(100).level(), 9);
    }

    #[test]
    fn test_dict_size() {
        assert_eq!(LzmaLevel::FAST.dict_size(), 1 << 18);
        assert_eq!(LzmaLevel::DEFAULT.dict_size(), 1 << 23);
        assert_eq!(LzmaLevel::BEST.dict_size(), 1 << 26);
    }

    #[test]
    fn test_presets() {
        let p0 = LzmaOptions::from_preset(0).unwrap();
        assert_eq!(p0.mode, Mode::Fast);
        assert_eq!(p0.match_finder, MatchFinder::Hc4);
        assert_eq!(p0.nice_len, 128);
        assert_eq!(p0.depth_limit, 4);

        let p3 = LzmaOptions::from_preset(3).unwrap();
        assert_eq!(p3.nice_len, 273);
        assert_eq!(p3.depth_limit, 48);

        let p4 = LzmaOptions::from_preset(4).unwrap();
        assert_eq!(p4.mode, Mode::Normal);
        assert_eq!(p4.match_finder, MatchFinder::Bt4);
        assert_eq!(p4.nice_len, 16);
        assert_eq!(p4.dict_size, 1 << 22);

        let p6 = LzmaOptions::new();
        assert_eq!(p6, LzmaOptions::from_preset(6).unwrap());
        assert_eq!(p6.nice_len, 64);
        assert_eq!(p6.depth_limit, 0);
        assert_eq!((p6.lc, p6.lp, p6.pb), (3, 0, 2));

        for preset in 0..=9 {
            assert!(LzmaOptions::from_preset(preset).unwrap().validate().is_ok());
        }
    }

    #[test]
    fn test_bad_preset() {
        let err = LzmaOptions::from_preset(10).unwrap_err();
        assert!(matches!(err, LzmaError::UnsupportedConfig { .. }));
    }

    #[test]
    fn test_validate() {
        let ok = LzmaOptions::new();
        assert!(ok.clone().dict_size(4096).validate().is_ok());
        assert!(ok.clone().dict_size(0).validate().is_err());
        assert!(ok.clone().dict_size(DICT_SIZE_MAX + 1).validate().is_err());
        assert!(ok.clone().lc_lp(4, 0).validate().is_ok());
        assert!(ok.clone().lc_lp(3, 2).validate().is_err());
        assert!(ok.clone().lc_lp(5, 0).validate().is_err());
        assert!(ok.clone().pb(5).validate().is_err());
        assert!(ok.clone().nice_len(7).validate().is_err());
        assert!(ok.clone().nice_len(274).validate().is_err());
        assert!(ok.nice_len(273).validate().is_ok());
    }

    #[test]
    fn test_filter_props() {
        assert_eq!(LzmaOptions::new().dict_size(4096).filter_props(), 0);
        assert_eq!(LzmaOptions::new().dict_size(6144).filter_props(), 1);
        assert_eq!(LzmaOptions::new().dict_size(1 << 23).filter_props(), 22);
        assert_eq!(
            LzmaOptions::new().mode(Mode::Uncompressed).filter_props(),
            0
        );
    }

    #[test]
    fn test_memory_usage() {
        assert_eq!(encoder_memory_usage(1 << 20, 3, 0, MatchFinder::Hc4, Mode::Uncompressed), 70);

        let fast = encoder_memory_usage(1 << 20, 3, 0, MatchFinder::Hc4, Mode::Fast);
        let normal = encoder_memory_usage(1 << 20, 3, 0, MatchFinder::Bt4, Mode::Normal);
        assert!(fast > 1024);
        assert!(normal > fast);
        assert!(encoder_memory_usage(1 << 20, 4, 0, MatchFinder::Hc4, Mode::Fast) > fast);

        let options = LzmaOptions::new();
        assert_eq!(options.memory_usage_kib(), options.encoder_memory_usage());

        assert_eq!(lzma2_decoder_memory_usage(1 << 20), 40 + 64 + 1024);
        assert_eq!(lzma_decoder_memory_usage(1 << 20, 3, 0), 10 + 1024 + 12);
        assert_eq!(lzma_decoder_memory_usage(0, 0, 0), 10 + 4 + 1);
    }

    #[test]
    fn test_check_memory_limit() {
        assert!(check_memory_limit(100, None).is_ok());
        assert!(check_memory_limit(100, Some(100)).is_ok());
        let err = check_memory_limit(101, Some(100)).unwrap_err();
        assert!(matches!(
            err,
            LzmaError::MemoryLimitExceeded {
                needed_kib: 101,
                limit_kib: 100
            }
        ));
    }
}
