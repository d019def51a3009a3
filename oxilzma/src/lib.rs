//! # OxiLZMA
//!
//! LZMA and LZMA2 compression and decompression.
//!
//! This crate is the codec core behind the `.xz` and `.7z` formats: it
//! produces and consumes raw LZMA1 streams and raw LZMA2 streams. The
//! container headers that carry the properties and dictionary size of a
//! stream are left to the caller.
//!
//! ## Features
//!
//! - **Pure Rust** streaming encoder and decoder
//! - Hash chain (HC4) and binary tree (BT4) match finders
//! - Greedy (`Fast`) and price-optimal (`Normal`) parsing
//! - LZMA2 chunking with sync flush and stored-chunk fallback
//! - Preset dictionaries and memory-usage estimates
//!
//! ## Usage
//!
//! ### One-shot
//!
//! ```rust
//! use oxilzma::{LzmaOptions, compress_lzma2, decompress_lzma2};
//!
//! let options = LzmaOptions::from_preset(6)?;
//! let compressed = compress_lzma2(b"Hello, World! Hello, World!", &options)?;
//! let decompressed = decompress_lzma2(&compressed, options.dict_size)?;
//! assert_eq!(decompressed, b"Hello, World! Hello, World!");
//! # Ok::<(), oxilzma::LzmaError>(())
//! ```
//!
//! ### Streaming
//!
//! ```rust
//! use oxilzma::{Lzma2Reader, Lzma2Writer, LzmaOptions};
//! use std::io::{Read, Write};
//!
//! let options = LzmaOptions::from_preset(1)?;
//! let mut writer = Lzma2Writer::new(Vec::new(), &options)?;
//! writer.write_all(b"first part, ")?;
//! writer.flush()?; // everything so far is decodable
//! writer.write_all(b"second part")?;
//! let compressed = writer.finish()?;
//!
//! let mut reader = Lzma2Reader::new(&compressed[..], options.dict_size)?;
//! let mut out = String::new();
//! reader.read_to_string(&mut out)?;
//! assert_eq!(out, "first part, second part");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Layers
//!
//! - [`range_coder`]: binary range coding and the bit price table
//! - [`model`]: probability tables and the 12-state machine
//! - [`lz`]: encoder window, match finders and decoder dictionary
//! - [`encoder`], [`fast`], [`optimal`]: symbol encoding and parsing
//! - [`decoder`]: symbol decoding
//! - [`lzma1`], [`lzma2`]: stream writers and readers
//! - [`options`]: options, presets and memory estimates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decoder;
pub mod encoder;
pub mod fast;
pub mod lz;
pub mod lzma1;
pub mod lzma2;
pub mod model;
pub mod optimal;
pub mod options;
pub mod range_coder;

// Re-exports
pub use decoder::LzmaDecoder;
pub use encoder::LzmaEncoder;
pub use lzma1::{LzmaReader, LzmaWriter};
pub use lzma2::{Lzma2Reader, Lzma2Writer, dict_size_from_props, props_from_dict_size};
pub use model::LzmaProperties;
pub use options::{
    LzmaLevel, LzmaOptions, MatchFinder, Mode, encoder_memory_usage, lzma_decoder_memory_usage,
    lzma2_decoder_memory_usage,
};
pub use oxilzma_core::error::{LzmaError, Result};
pub use oxilzma_core::traits::{FinishableWrite, MemoryUsage};

use std::io::{Read, Write};

/// Compress `data` into a raw LZMA2 stream.
pub fn compress_lzma2(data: &[u8], options: &LzmaOptions) -> Result<Vec<u8>> {
    let mut writer = Lzma2Writer::new(Vec::with_capacity(data.len() / 2 + 16), options)?;
    writer.write_all(data).map_err(LzmaError::from_io)?;
    writer.finish()
}

/// Decompress a raw LZMA2 stream compressed with `dict_size`.
pub fn decompress_lzma2(data: &[u8], dict_size: u32) -> Result<Vec<u8>> {
    let mut reader = Lzma2Reader::new(data, dict_size)?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out).map_err(LzmaError::from_io)?;
    Ok(out)
}

/// Compress `data` into a raw LZMA1 stream terminated by an end marker.
pub fn compress_lzma1(data: &[u8], options: &LzmaOptions) -> Result<Vec<u8>> {
    let mut writer = LzmaWriter::new(Vec::with_capacity(data.len() / 2 + 16), options, true, None)?;
    writer.write_all(data).map_err(LzmaError::from_io)?;
    writer.finish()
}

/// Decompress a raw LZMA1 stream. Without `uncompressed_size` the stream
/// must end in an end marker.
pub fn decompress_lzma1(
    data: &[u8],
    props: LzmaProperties,
    dict_size: u32,
    uncompressed_size: Option<u64>,
) -> Result<Vec<u8>> {
    let mut reader = LzmaReader::new(data, props, dict_size, uncompressed_size)?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out).map_err(LzmaError::from_io)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lzma2_single_byte() {
        let options = LzmaOptions::new().dict_size(1 << 16);
        let compressed = compress_lzma2(b"A", &options).unwrap();
        assert_eq!(decompress_lzma2(&compressed, 1 << 16).unwrap(), b"A");
    }

    #[test]
    fn test_lzma2_hello() {
        let original = b"Hello";
        let options = LzmaOptions::from_preset(0).unwrap();
        let compressed = compress_lzma2(original, &options).unwrap();
        assert_eq!(decompress_lzma2(&compressed, options.dict_size).unwrap(), original);
    }

    #[test]
    fn test_lzma1_roundtrip() {
        let original = b"TOBEORNOTTOBEORTOBEORNOT".repeat(40);
        let options = LzmaOptions::from_preset(3).unwrap();
        let compressed = compress_lzma1(&original, &options).unwrap();
        assert!(compressed.len() < original.len());

        let decompressed =
            decompress_lzma1(&compressed, options.props(), options.dict_size, None).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_every_preset_roundtrips() {
        let original: Vec<u8> = (0..20_000u32).map(|i| ((i * 7) % 13 + (i / 100) % 5) as u8).collect();
        for preset in [0, 3, 4, 6] {
            let options = LzmaOptions::from_preset(preset).unwrap().dict_size(1 << 18);
            let compressed = compress_lzma2(&original, &options).unwrap();
            let decompressed = decompress_lzma2(&compressed, 1 << 18).unwrap();
            assert_eq!(decompressed, original, "preset {preset}");
        }
    }

    #[test]
    fn test_properties_byte() {
        let props = LzmaProperties::new(3, 0, 2);
        assert_eq!(props.to_byte(), 0x5D);
        assert_eq!(LzmaProperties::from_byte(0x5D), Some(props));
    }
}
