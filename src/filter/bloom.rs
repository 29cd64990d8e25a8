//! Bloom filter over byte-string keys.
//!
//! The `k` bit positions of a key come from double hashing, `h1 + i * h2 (mod m)`, with
//! `h1` and `h2` two differently seeded FNV-1a hashes of the key.

use crate::filter::MembershipFilter;
use std::f64::consts::LN_2;

/// Number of hash functions used by [`BloomFilter::with_size`].
pub const DEFAULT_NUM_HASHES: u32 = 3;

/// Smallest bit array either constructor allocates.
const MIN_BITS: usize = 64;

const SEED_PRIMARY: u64 = 0xbc9f_1d34;
const SEED_SECONDARY: u64 = 0xd0e8_9c7b;

/// Probabilistic set of byte strings with no false negatives.
///
/// # Example
/// ```
/// use lsmcore::filter::{BloomFilter, MembershipFilter};
///
/// let mut filter = BloomFilter::new(1000, 0.01);
/// filter.add(b"apple");
///
/// assert!(filter.may_contain(b"apple"));
/// assert_eq!(filter.num_items(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct BloomFilter {
    /// Bit array packed into 64-bit words
    words: Vec<u64>,
    /// Usable bits; positions are taken modulo this
    num_bits: usize,
    /// Bit positions set per key
    num_hashes: u32,
    /// `add` calls so far
    num_items: usize,
}

impl BloomFilter {
    /// Sizes a filter for `expected_keys` insertions at `false_positive_rate`.
    ///
    /// Uses `m = -n ln(p) / ln(2)^2` bits and `k = (m / n) ln(2)` hash functions. The
    /// rate is clamped to `[0.0001, 0.9999]`; zero expected keys yields the
    /// minimum-size filter with one hash function.
    pub fn new(expected_keys: usize, false_positive_rate: f64) -> Self {
        if expected_keys == 0 {
            return Self::build(MIN_BITS, 1);
        }

        let n = expected_keys as f64;
        let p = false_positive_rate.clamp(0.0001, 0.9999);
        let num_bits = ((-n * p.ln()) / (LN_2 * LN_2)).ceil() as usize;
        let num_bits = num_bits.max(MIN_BITS);
        let num_hashes = ((num_bits as f64 / n) * LN_2).ceil() as u32;

        Self::build(num_bits, num_hashes.clamp(1, 30))
    }

    /// A filter of exactly `num_bits` bits using [`DEFAULT_NUM_HASHES`] hash functions.
    pub fn with_size(num_bits: usize) -> Self {
        Self::build(num_bits.max(1), DEFAULT_NUM_HASHES)
    }

    fn build(num_bits: usize, num_hashes: u32) -> Self {
        Self { words: vec![0; num_bits.div_ceil(64)], num_bits, num_hashes, num_items: 0 }
    }

    fn bit_positions(&self, key: &[u8]) -> impl Iterator<Item = usize> {
        let h1 = fnv1a(key, SEED_PRIMARY);
        let h2 = fnv1a(key, SEED_SECONDARY);
        let m = self.num_bits as u64;
        (0..u64::from(self.num_hashes)).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
    }

    fn bit(&self, pos: usize) -> bool {
        self.words[pos / 64] & (1u64 << (pos % 64)) != 0
    }

    /// Bytes held by the bit array.
    pub fn size(&self) -> usize {
        self.words.len() * 8
    }

    /// Hash functions per key.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Usable bits.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Number of `add` calls so far, duplicates included.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Expected false positive rate once `num_keys` distinct keys are in:
    /// `(1 - e^(-k n / m))^k`.
    pub fn estimated_false_positive_rate(&self, num_keys: usize) -> f64 {
        if num_keys == 0 {
            return 0.0;
        }
        let k = f64::from(self.num_hashes);
        let fill = 1.0 - (-k * num_keys as f64 / self.num_bits as f64).exp();
        fill.powf(k)
    }
}

impl MembershipFilter for BloomFilter {
    fn add(&mut self, item: &[u8]) {
        for pos in self.bit_positions(item).collect::<Vec<_>>() {
            self.words[pos / 64] |= 1u64 << (pos % 64);
        }
        self.num_items += 1;
    }

    fn may_contain(&self, item: &[u8]) -> bool {
        self.bit_positions(item).all(|pos| self.bit(pos))
    }
}

/// 64-bit FNV-1a with the offset basis perturbed by `seed`.
fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    bytes.iter().fold(OFFSET_BASIS ^ seed, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> Vec<u8> {
        format!("key{}", i).into_bytes()
    }

    #[test]
    fn test_added_keys_are_found() {
        let mut filter = BloomFilter::new(2000, 0.01);
        for i in 0..2000 {
            filter.add(&key(i));
        }
        for i in 0..2000 {
            assert!(filter.may_contain(&key(i)), "lost {}", i);
        }
        assert_eq!(filter.num_items(), 2000);
    }

    #[test]
    fn test_observed_false_positive_rate() {
        let target = 0.01;
        let mut filter = BloomFilter::new(10_000, target);
        for i in 0..10_000 {
            filter.add(&key(i));
        }

        let hits = (10_000..20_000).filter(|&i| filter.may_contain(&key(i))).count();
        let observed = hits as f64 / 10_000.0;
        assert!(observed < target * 2.0, "observed rate {:.4}", observed);
    }

    #[test]
    fn test_sizing_follows_formula() {
        let filter = BloomFilter::new(1000, 0.01);
        // 1000 keys at 1% need ~9586 bits and 7 hashes
        assert!((9500..9700).contains(&filter.num_bits()));
        assert_eq!(filter.num_hashes(), 7);
        assert_eq!(filter.size(), filter.num_bits().div_ceil(64) * 8);
        assert!(filter.estimated_false_positive_rate(1000) < 0.02);
        assert_eq!(filter.estimated_false_positive_rate(0), 0.0);
    }

    #[test]
    fn test_fixed_size_filter() {
        let mut filter = BloomFilter::with_size(100);
        assert_eq!(filter.num_hashes(), DEFAULT_NUM_HASHES);
        assert_eq!(filter.num_bits(), 100);

        for _ in 0..=100 {
            filter.add(b"r");
        }
        assert!(filter.may_contain(b"r"));
        assert_eq!(filter.num_items(), 101);
    }

    #[test]
    fn test_fresh_filter_rejects_everything() {
        let filter = BloomFilter::new(0, 0.01);
        assert_eq!(filter.num_bits(), MIN_BITS);
        assert!(!filter.may_contain(b"anything"));
        assert!(!filter.may_contain(b""));
    }

    #[test]
    fn test_seeds_give_independent_hashes() {
        assert_eq!(fnv1a(b"test", SEED_PRIMARY), fnv1a(b"test", SEED_PRIMARY));
        assert_ne!(fnv1a(b"test", SEED_PRIMARY), fnv1a(b"test", SEED_SECONDARY));
    }
}
