//! Bloom filter sizing formulas
//!
//! Formulas:
//! - n = ceil(m * ln(2)^2 / |ln(p)|)  -- elements a filter of m bits holds at FPR p
//! - k = ceil(log2(1 / p))            -- hash functions for FPR p
//! - FPR = (1 - e^(-kn/m))^k          -- expected FPR after n inserts

use std::f64::consts::LN_2;

/// Number of elements a filter of `num_bits` bits can hold before its
/// false positive rate exceeds `error_probability`
pub fn element_limit(num_bits: u64, error_probability: f64) -> u64 {
    let ln2_squared = LN_2 * LN_2;
    (num_bits as f64 * ln2_squared / error_probability.ln().abs()).ceil() as u64
}

/// Number of hash functions for a target false positive rate
pub fn hash_count(error_probability: f64) -> u32 {
    (1.0 / error_probability).log2().ceil() as u32
}

/// Calculate the false positive rate for given parameters
///
/// Formula: FPR = (1 - e^(-kn/m))^k
pub fn calculate_fpr(m: usize, n: u64, k: u32) -> f64 {
    if m == 0 {
        return 1.0;
    }
    let exponent = -(k as f64) * (n as f64) / (m as f64);
    (1.0 - exponent.exp()).powi(k as i32)
}
