//! Hash tables for 2-, 3- and 4-byte prefixes.
//!
//! The hashes mix the first bytes through the CRC-32 table so that the
//! 3- and 4-byte hashes share the work of the 2-byte one.

use super::normalize;
use oxilzma_core::crc::CRC32_TABLE;

const HASH_2_SIZE: usize = 1 << 10;
const HASH_2_MASK: u32 = HASH_2_SIZE as u32 - 1;

const HASH_3_SIZE: usize = 1 << 16;
const HASH_3_MASK: u32 = HASH_3_SIZE as u32 - 1;

/// Hash heads of the match finders.
#[derive(Debug)]
pub struct Hash234 {
    hash4_mask: u32,

    hash2_table: Vec<i32>,
    hash3_table: Vec<i32>,
    hash4_table: Vec<i32>,

    hash2_value: usize,
    hash3_value: usize,
    hash4_value: usize,
}

/// Size of the 4-byte hash table for a dictionary of `dict_size` bytes.
pub(crate) fn hash4_size(dict_size: u32) -> usize {
    let mut h = dict_size.saturating_sub(1);
    h |= h >> 1;
    h |= h >> 2;
    h |= h >> 4;
    h |= h >> 8;
    h >>= 1;
    h |= 0xFFFF;
    if h > (1 << 24) {
        h >>= 1;
    }
    h as usize + 1
}

/// Memory usage of the hash tables in KiB.
pub(crate) fn memory_usage(dict_size: u32) -> u64 {
    // Sizes count i32 entries, four bytes each.
    ((HASH_2_SIZE + HASH_3_SIZE + hash4_size(dict_size)) / (1024 / 4) + 4) as u64
}

impl Hash234 {
    /// Create empty hash tables for `dict_size`.
    pub fn new(dict_size: u32) -> Self {
        let hash4_size = hash4_size(dict_size);
        Self {
            hash4_mask: hash4_size as u32 - 1,
            hash2_table: vec![0; HASH_2_SIZE],
            hash3_table: vec![0; HASH_3_SIZE],
            hash4_table: vec![0; hash4_size],
            hash2_value: 0,
            hash3_value: 0,
            hash4_value: 0,
        }
    }

    /// Hash the four bytes at `buf[off..off + 4]`.
    #[inline]
    pub fn calc_hashes(&mut self, buf: &[u8], off: usize) {
        let mut temp = CRC32_TABLE[buf[off] as usize] ^ buf[off + 1] as u32;
        self.hash2_value = (temp & HASH_2_MASK) as usize;

        temp ^= (buf[off + 2] as u32) << 8;
        self.hash3_value = (temp & HASH_3_MASK) as usize;

        temp ^= CRC32_TABLE[buf[off + 3] as usize] << 5;
        self.hash4_value = (temp & self.hash4_mask) as usize;
    }

    /// Most recent position with the same 2-byte hash.
    #[inline]
    pub fn hash2_pos(&self) -> i32 {
        self.hash2_table[self.hash2_value]
    }

    /// Most recent position with the same 3-byte hash.
    #[inline]
    pub fn hash3_pos(&self) -> i32 {
        self.hash3_table[self.hash3_value]
    }

    /// Most recent position with the same 4-byte hash.
    #[inline]
    pub fn hash4_pos(&self) -> i32 {
        self.hash4_table[self.hash4_value]
    }

    /// Record `pos` as the newest position for the current hashes.
    #[inline]
    pub fn update_tables(&mut self, pos: i32) {
        self.hash2_table[self.hash2_value] = pos;
        self.hash3_table[self.hash3_value] = pos;
        self.hash4_table[self.hash4_value] = pos;
    }

    /// Subtract `offset` from every stored position.
    pub fn normalize(&mut self, offset: i32) {
        normalize(&mut self.hash2_table, offset);
        normalize(&mut self.hash3_table, offset);
        normalize(&mut self.hash4_table, offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash4_size() {
        assert_eq!(hash4_size(4096), 1 << 16);
        assert_eq!(hash4_size(1 << 20), 1 << 19);
        assert_eq!(hash4_size(8 << 20), 1 << 22);
        // Halved once it would exceed 16 Mi entries.
        assert_eq!(hash4_size(64 << 20), 1 << 24);
        assert_eq!(hash4_size(1 << 30), 1 << 28);
    }

    #[test]
    fn test_memory_usage() {
        assert_eq!(memory_usage(4096), ((1 << 10) + (1 << 16) + (1 << 16)) / 256 + 4);
    }

    #[test]
    fn test_same_prefix_same_hashes() {
        let mut hash = Hash234::new(1 << 16);
        let buf = b"abcdXabcdY";
        hash.calc_hashes(buf, 0);
        hash.update_tables(7);

        hash.calc_hashes(buf, 5);
        assert_eq!(hash.hash2_pos(), 7);
        assert_eq!(hash.hash3_pos(), 7);
        assert_eq!(hash.hash4_pos(), 7);

        hash.normalize(5);
        assert_eq!(hash.hash4_pos(), 2);
        hash.normalize(5);
        assert_eq!(hash.hash4_pos(), 0);
    }
}
