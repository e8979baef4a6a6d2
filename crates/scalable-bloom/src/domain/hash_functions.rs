//! Hash functions for tier filters
//!
//! MurmurHash3 x64/128 with double hashing. Every tier of a scalable filter
//! shares the controller's seed, so two processes configured with the same
//! seed compute identical bit positions for the same key.

use std::io::Cursor;

/// Hash a key with MurmurHash3, folding the hash-function index into the seed
pub fn murmur_hash(key: &[u8], index: u32, seed: u32) -> u64 {
    let combined_seed = seed.wrapping_add(index);
    let mut cursor = Cursor::new(key);

    // Lower 64 bits of the 128-bit digest
    let hash = murmur3::murmur3_x64_128(&mut cursor, combined_seed).unwrap_or(0);
    hash as u64
}

/// Compute `k` bit positions in `[0, m)` for a key
///
/// Double hashing: `h(i) = h1 + i * h2`.
pub fn compute_hash_positions(key: &[u8], k: usize, m: usize, seed: u32) -> Vec<usize> {
    let h1 = murmur_hash(key, 0, seed);
    let h2 = murmur_hash(key, 1, seed);

    (0..k)
        .map(|i| {
            let hash = h1.wrapping_add((i as u64).wrapping_mul(h2));
            (hash % m as u64) as usize
        })
        .collect()
}
