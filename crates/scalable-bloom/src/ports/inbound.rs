//! Inbound Ports (Driving Ports)
//!
//! The API callers use to deduplicate keys against a scalable filter.

use crate::error::FilterError;

/// Primary scalable filter API (Driving Port)
///
/// Not atomic across instances: `insert` is a membership check followed by a
/// write, so two controllers sharing keyed-store tiers can both accept the
/// same absent key. Serialize such callers with
/// [`NamespaceLock`](crate::adapters::NamespaceLock).
pub trait ScalableFilterApi {
    /// Insert a key with weight 1
    ///
    /// Returns `false` without changing any counter if the key already tests
    /// as present in some tier.
    fn insert(&mut self, key: &[u8]) -> Result<bool, FilterError> {
        self.insert_weighted(key, 1)
    }

    /// Insert a key, adding `weight` to the weighted count when tracked
    fn insert_weighted(&mut self, key: &[u8], weight: u64) -> Result<bool, FilterError>;

    /// Whether any tier reports the key as present
    fn include(&self, key: &[u8]) -> Result<bool, FilterError>;

    /// Distinct keys accepted so far
    fn count(&self) -> u64;

    /// Sum of weights of accepted keys, `None` under schema version 1
    fn weighted_count(&self) -> Option<u64>;

    /// Number of allocated tiers
    fn size(&self) -> usize;

    /// Tier identifiers in creation order
    fn keys(&self) -> Vec<String>;

    /// Ask every tier backend to release its durable storage
    fn delete_all(&mut self) -> Result<(), FilterError>;
}
