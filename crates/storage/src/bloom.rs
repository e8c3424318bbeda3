//! Bloom filter for negative-lookup short-circuiting in the local disk cache.
//!
//! A probe that misses the filter is guaranteed absent from the cache and
//! skips the metadata probe and disk read entirely. False positives fall
//! through to the slower path; there are no false negatives.

use std::hash::{Hash, Hasher};

use parking_lot::Mutex;
use rustc_hash::FxHasher;

/// A fixed-size bit array probed with `k` double-hashed positions per key.
pub struct BloomFilter {
    bits: Mutex<Vec<u64>>,
    num_bits: usize,
    k: u32,
}

impl BloomFilter {
    /// A filter sized for `expected_items` at a target false-positive rate.
    ///
    /// Uses the standard `m = -n ln(p) / (ln 2)^2` sizing formula, rounded up
    /// to a whole number of `u64` words.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(0.0001, 0.5);
        let m = (-n * p.ln() / (std::f64::consts::LN_2 * std::f64::consts::LN_2)).ceil() as usize;
        let num_bits = m.max(64);
        let k = ((num_bits as f64 / n) * std::f64::consts::LN_2).round().clamp(1.0, 16.0) as u32;
        let words = num_bits.div_ceil(64);
        BloomFilter {
            bits: Mutex::new(vec![0u64; words]),
            num_bits,
            k,
        }
    }

    fn hashes(key: &str) -> (u64, u64) {
        let mut h1 = FxHasher::default();
        key.hash(&mut h1);
        let a = h1.finish();
        let mut h2 = FxHasher::default();
        (key, "nexus-bloom-salt").hash(&mut h2);
        let b = h2.finish() | 1; // odd step avoids degenerate cycles in double hashing
        (a, b)
    }

    /// Record `key` as present.
    pub fn insert(&self, key: &str) {
        let (a, b) = Self::hashes(key);
        let mut bits = self.bits.lock();
        for i in 0..self.k {
            let pos = (a.wrapping_add(i as u64 * b) as usize) % self.num_bits;
            bits[pos / 64] |= 1 << (pos % 64);
        }
    }

    /// `true` if `key` might be present; `false` means it is definitely absent.
    pub fn might_contain(&self, key: &str) -> bool {
        let (a, b) = Self::hashes(key);
        let bits = self.bits.lock();
        for i in 0..self.k {
            let pos = (a.wrapping_add(i as u64 * b) as usize) % self.num_bits;
            if bits[pos / 64] & (1 << (pos % 64)) == 0 {
                return false;
            }
        }
        true
    }

    /// Remove every recorded key. Used when the cache is cleared.
    pub fn clear(&self) {
        let mut bits = self.bits.lock();
        bits.iter_mut().for_each(|w| *w = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_is_never_a_false_negative() {
        let bloom = BloomFilter::new(1000, 0.01);
        assert!(!bloom.might_contain("never-inserted"));
    }

    #[test]
    fn inserted_key_always_reported_present() {
        let bloom = BloomFilter::new(1000, 0.01);
        for i in 0..500 {
            bloom.insert(&format!("key-{i}"));
        }
        for i in 0..500 {
            assert!(bloom.might_contain(&format!("key-{i}")));
        }
    }

    #[test]
    fn clear_forgets_everything() {
        let bloom = BloomFilter::new(100, 0.01);
        bloom.insert("a");
        bloom.clear();
        assert!(!bloom.might_contain("a"));
    }
}
