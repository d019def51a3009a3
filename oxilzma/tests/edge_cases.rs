//! Edge case tests for LZMA2 and raw LZMA streams.

use oxilzma::{
    LzmaError, LzmaOptions, LzmaProperties, MatchFinder, Mode, compress_lzma1, compress_lzma2,
    decompress_lzma1, decompress_lzma2,
};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// One parsed LZMA2 chunk header.
#[derive(Debug)]
struct Chunk {
    control: u8,
    uncompressed: usize,
    compressed: Option<usize>,
}

/// Walk the chunk headers of an LZMA2 stream.
fn parse_chunks(stream: &[u8]) -> Vec<Chunk> {
    let be16 = |i: usize| ((stream[i] as usize) << 8 | stream[i + 1] as usize) + 1;
    let mut chunks = Vec::new();
    let mut i = 0;

    loop {
        let control = stream[i];
        match control {
            0x00 => {
                assert_eq!(i + 1, stream.len(), "data after the end marker");
                return chunks;
            }
            0x01 | 0x02 => {
                let size = be16(i + 1);
                chunks.push(Chunk {
                    control,
                    uncompressed: size,
                    compressed: None,
                });
                i += 3 + size;
            }
            0x80..=0xFF => {
                let uncompressed = (((control & 0x1F) as usize) << 16) + be16(i + 1);
                let compressed = be16(i + 3);
                let header = if control >= 0xC0 { 6 } else { 5 };
                chunks.push(Chunk {
                    control,
                    uncompressed,
                    compressed: Some(compressed),
                });
                i += header + compressed;
            }
            _ => panic!("invalid control byte {control:#04x} at {i}"),
        }
    }
}

fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

/// Text made of words picked at random from a small vocabulary.
fn word_salad(seed: u64, len: usize) -> Vec<u8> {
    const WORDS: &[&str] = &[
        "range", "coder", "literal", "match", "window", "chunk", "dictionary", "state",
        "distance", "length", "price", "symbol", "stream", "reset", "buffer", "finder",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(len + 16);
    while data.len() < len {
        data.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())].as_bytes());
        data.push(if rng.gen_range(0..10) == 0 { b'\n' } else { b' ' });
    }
    data.truncate(len);
    data
}

#[test]
fn test_empty_input() {
    let options = LzmaOptions::new();
    let compressed = compress_lzma2(b"", &options).unwrap();
    assert_eq!(compressed, [0x00]);
    assert!(decompress_lzma2(&compressed, options.dict_size).unwrap().is_empty());
}

#[test]
fn test_repeated_byte_is_one_short_chunk() {
    let input = vec![0x41u8; 100_000];
    let options = LzmaOptions::new();
    let compressed = compress_lzma2(&input, &options).unwrap();

    let chunks = parse_chunks(&compressed);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].control, 0xE1);
    assert_eq!(chunks[0].uncompressed, 100_000);
    assert!(compressed.len() < 200, "got {} bytes", compressed.len());

    let decompressed = decompress_lzma2(&compressed, options.dict_size).unwrap();
    assert_eq!(decompressed, input);
}

#[test]
fn test_random_input_falls_back_to_uncompressed() {
    let input = random_bytes(0x5EED, 70_000);
    let options = LzmaOptions::new();
    let compressed = compress_lzma2(&input, &options).unwrap();

    let chunks = parse_chunks(&compressed);
    assert!(chunks.iter().any(|c| c.compressed.is_none()));
    assert_eq!(chunks[0].control, 0x01);
    assert_eq!(chunks.iter().map(|c| c.uncompressed).sum::<usize>(), input.len());

    let decompressed = decompress_lzma2(&compressed, options.dict_size).unwrap();
    assert_eq!(decompressed, input);
}

#[test]
fn test_minimum_dictionary() {
    let input = b"0123456789";
    let options = LzmaOptions::new().dict_size(4096);
    let compressed = compress_lzma2(input, &options).unwrap();
    assert_eq!(decompress_lzma2(&compressed, 4096).unwrap(), input);

    let err = compress_lzma2(input, &LzmaOptions::new().dict_size(0)).unwrap_err();
    assert!(matches!(err, LzmaError::UnsupportedConfig { .. }));

    let err = decompress_lzma2(&compressed, 0).unwrap_err();
    assert!(matches!(err, LzmaError::UnsupportedConfig { .. }));
}

#[test]
fn test_flipped_size_byte_is_corruption() {
    let input = vec![0x41u8; 100_000];
    let options = LzmaOptions::new();
    let mut compressed = compress_lzma2(&input, &options).unwrap();

    compressed[4] ^= 0x01;
    let err = decompress_lzma2(&compressed, options.dict_size).unwrap_err();
    assert!(err.is_corruption(), "unexpected error: {err}");
}

#[test]
fn test_normal_not_larger_than_fast() {
    let input = word_salad(7, 200_000);
    let base = LzmaOptions::new()
        .dict_size(1 << 20)
        .nice_len(64)
        .match_finder(MatchFinder::Bt4);

    let fast = compress_lzma2(&input, &base.clone().mode(Mode::Fast)).unwrap();
    let normal = compress_lzma2(&input, &base.clone().mode(Mode::Normal)).unwrap();

    assert_eq!(decompress_lzma2(&fast, 1 << 20).unwrap(), input);
    assert_eq!(decompress_lzma2(&normal, 1 << 20).unwrap(), input);
    assert!(
        normal.len() <= fast.len(),
        "normal {} > fast {}",
        normal.len(),
        fast.len()
    );
}

#[test]
fn test_chunk_bounds() {
    let mut input = word_salad(11, 1 << 20);
    input.extend(std::iter::repeat_n(0u8, 3 << 20));
    input.extend(random_bytes(12, 200_000));

    for options in [
        LzmaOptions::from_preset(1).unwrap(),
        LzmaOptions::from_preset(5).unwrap().dict_size(1 << 20),
    ] {
        let compressed = compress_lzma2(&input, &options).unwrap();
        let chunks = parse_chunks(&compressed);
        assert!(chunks.len() > 1);
        // The run of zeros fills LZMA chunks up to their uncompressed limit.
        assert!(chunks.iter().any(|c| c.uncompressed > 1 << 20));

        for chunk in &chunks {
            match chunk.compressed {
                Some(compressed) => {
                    assert!(chunk.uncompressed <= 1 << 21);
                    assert!(compressed <= 1 << 16);
                    assert!(compressed + 2 < chunk.uncompressed);
                }
                None => assert!(chunk.uncompressed <= 1 << 16),
            }
        }
        assert_eq!(chunks.iter().map(|c| c.uncompressed).sum::<usize>(), input.len());
        assert_eq!(decompress_lzma2(&compressed, options.dict_size).unwrap(), input);
    }
}

#[test]
fn test_no_expansion() {
    let input = random_bytes(99, 300_000);
    for mode in [Mode::Fast, Mode::Normal, Mode::Uncompressed] {
        let options = LzmaOptions::new().dict_size(1 << 20).mode(mode);
        let compressed = compress_lzma2(&input, &options).unwrap();
        let chunk_count = parse_chunks(&compressed).len();
        assert!(compressed.len() <= input.len() + 4 * chunk_count + 1);
        assert!(chunk_count <= input.len().div_ceil(60_000) + 2);
    }
}

#[test]
fn test_deterministic_output() {
    let mut input = word_salad(21, 150_000);
    input.extend(random_bytes(22, 20_000));

    for (mode, mf) in [(Mode::Fast, MatchFinder::Hc4), (Mode::Normal, MatchFinder::Bt4)] {
        let options = LzmaOptions::new()
            .dict_size(1 << 18)
            .mode(mode)
            .match_finder(mf);
        let first = compress_lzma2(&input, &options).unwrap();
        let second = compress_lzma2(&input, &options).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_literal_properties() {
    let input = word_salad(31, 50_000);
    for (lc, lp, pb) in [(0, 0, 0), (4, 0, 4), (0, 4, 0), (1, 3, 2)] {
        let options = LzmaOptions::from_preset(2)
            .unwrap()
            .dict_size(1 << 16)
            .lc_lp(lc, lp)
            .pb(pb);
        let compressed = compress_lzma2(&input, &options).unwrap();
        assert_eq!(
            decompress_lzma2(&compressed, 1 << 16).unwrap(),
            input,
            "lc={lc} lp={lp} pb={pb}"
        );
    }
}

#[test]
fn test_lzma1_normal_mode_roundtrip() {
    let input = word_salad(41, 10_000);
    let options = LzmaOptions::from_preset(4).unwrap().dict_size(1 << 16);
    let compressed = compress_lzma1(&input, &options).unwrap();

    let props = LzmaProperties::new(3, 0, 2);
    assert_eq!(
        decompress_lzma1(&compressed, props, 1 << 16, None).unwrap(),
        input
    );
}

#[test]
fn test_lzma1_preset_dict_required() {
    let dict = word_salad(51, 4000);
    let options = LzmaOptions::new()
        .dict_size(1 << 16)
        .preset_dict(dict.clone());
    let compressed = compress_lzma1(&dict, &options).unwrap();

    let err = decompress_lzma1(&compressed, options.props(), 1 << 16, None).unwrap_err();
    assert!(matches!(err, LzmaError::InvalidDistance { .. }), "got {err}");
}
