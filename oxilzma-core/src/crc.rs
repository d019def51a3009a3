//! CRC-32 lookup table.
//!
//! The LZMA match finders hash their first bytes through the reflected CRC-32
//! table (polynomial 0xEDB88320), so the table is exposed as a `const` and
//! built entirely at compile time.

/// CRC-32 lookup table (polynomial 0xEDB88320, reflected).
pub const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};
