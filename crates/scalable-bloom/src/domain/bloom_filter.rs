//! Core Bloom filter implementation
//!
//! INVARIANTS:
//! - No false negatives: if inserted, contains() MUST return true
//! - FPR = (1 - e^(-kn/m))^k stays at or below the tier target until n reaches
//!   the tier's element limit

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use super::hash_functions::compute_hash_positions;
use super::parameters::calculate_fpr;
use crate::error::SnapshotError;

/// Bloom filter for probabilistic membership testing
///
/// The bit array may be allocated lazily: a filter created with
/// [`BloomFilter::new_lazy`] holds no bits until the first insert, and
/// answers `false` to every lookup until then.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BloomFilter {
    /// Bit array storing the filter state (empty until allocated)
    #[serde(with = "bitvec_serde")]
    bits: BitVec<u8, Lsb0>,
    /// Number of hash functions (k)
    k: usize,
    /// Size in bits (m)
    m: usize,
    /// Number of distinct elements inserted (n)
    n: u64,
    /// Hash seed shared by every tier of a controller
    seed: u32,
}

/// Serde support for BitVec
mod bitvec_serde {
    use bitvec::prelude::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bits: &BitVec<u8, Lsb0>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes: Vec<u8> = bits.as_raw_slice().to_vec();
        (bytes, bits.len()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BitVec<u8, Lsb0>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (bytes, len): (Vec<u8>, usize) = Deserialize::deserialize(deserializer)?;
        let mut bits = BitVec::<u8, Lsb0>::from_vec(bytes);
        bits.truncate(len);
        Ok(bits)
    }
}

impl BloomFilter {
    /// Create a Bloom filter with its full bit array allocated
    ///
    /// # Arguments
    /// * `m` - Size in bits
    /// * `k` - Number of hash functions
    /// * `seed` - Hash seed
    pub fn new(m: usize, k: usize, seed: u32) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 0; m],
            k,
            m,
            n: 0,
            seed,
        }
    }

    /// Create a Bloom filter that allocates its bit array on first insert
    pub fn new_lazy(m: usize, k: usize, seed: u32) -> Self {
        Self {
            bits: BitVec::new(),
            k,
            m,
            n: 0,
            seed,
        }
    }

    /// Whether the bit array has been allocated
    pub fn is_allocated(&self) -> bool {
        self.bits.len() == self.m
    }

    fn allocate(&mut self) {
        if !self.is_allocated() {
            self.bits = bitvec![u8, Lsb0; 0; self.m];
        }
    }

    /// Insert an element into the filter
    ///
    /// Returns `false` without touching any bit if the element already
    /// tests as present, `true` otherwise. After the call `contains(element)`
    /// is guaranteed to return true.
    pub fn insert(&mut self, element: &[u8]) -> bool {
        if self.contains(element) {
            return false;
        }
        self.allocate();
        for pos in compute_hash_positions(element, self.k, self.m, self.seed) {
            self.bits.set(pos, true);
        }
        self.n += 1;
        true
    }

    /// Test if an element might be in the filter
    ///
    /// Returns:
    /// - `true` if the element might be in the set (could be false positive)
    /// - `false` if the element is definitely NOT in the set
    pub fn contains(&self, element: &[u8]) -> bool {
        if !self.is_allocated() {
            return false;
        }
        compute_hash_positions(element, self.k, self.m, self.seed)
            .iter()
            .all(|&pos| self.bits[pos])
    }

    /// Calculate the current false positive rate
    pub fn false_positive_rate(&self) -> f64 {
        calculate_fpr(self.m, self.n, self.k as u32)
    }

    /// Get the number of bits set in the filter
    pub fn bits_set(&self) -> usize {
        self.bits.count_ones()
    }

    /// Get the filter size in bits
    pub fn size_bits(&self) -> usize {
        self.m
    }

    /// Get the number of hash functions
    pub fn hash_count(&self) -> usize {
        self.k
    }

    /// Get the number of elements inserted
    pub fn elements_inserted(&self) -> u64 {
        self.n
    }

    /// Get the hash seed
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Serialize the filter to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(|e| SnapshotError::Serialization(e.to_string()))
    }

    /// Deserialize a filter from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let filter: Self =
            bincode::deserialize(bytes).map_err(|e| SnapshotError::DataFormat(e.to_string()))?;
        if !filter.bits.is_empty() && filter.bits.len() != filter.m {
            return Err(SnapshotError::DataFormat(format!(
                "bit array length {} does not match filter size {}",
                filter.bits.len(),
                filter.m
            )));
        }
        Ok(filter)
    }
}
