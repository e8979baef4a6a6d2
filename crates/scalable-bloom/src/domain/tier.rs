//! Tier sizing schedule
//!
//! Tier `i` of a scalable filter is sized as:
//! - capacity    = initial_size * growth^i bits
//! - probability = bound * (1 - tightening) * tightening^i
//! - hash count  = ceil(log2(1 / probability))
//! - identifier  = "<namespace>/<i>"
//!
//! The probabilities form a geometric series summing to `bound`, which caps
//! the cumulative false positive rate however many tiers accumulate.

use serde::{Deserialize, Serialize};

use super::config::ScalableConfig;
use super::parameters::{element_limit, hash_count};
use crate::error::FilterError;

/// Sizing parameters handed to a backend when a tier is created
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierParams {
    /// Bit capacity
    pub capacity: u64,
    /// Number of hash functions
    pub hash_count: u32,
    /// Designed false positive rate of this tier
    pub target_probability: f64,
    /// Stable identifier, also the storage key of keyed backends
    pub identifier: String,
    /// Hash seed
    pub seed: u32,
    /// Pre-allocate the full bit capacity immediately
    pub eager: bool,
}

impl TierParams {
    /// Parameters of tier `index` under `config`
    pub fn for_index(config: &ScalableConfig, index: usize) -> Self {
        let exponent = index as i32;
        let target_probability =
            config.initial_probability() * config.tightening_factor.powi(exponent);
        let capacity = (config.initial_size as f64 * config.growth_factor.powi(exponent)).round();

        Self {
            capacity: capacity as u64,
            hash_count: hash_count(target_probability),
            target_probability,
            identifier: key_for_index(&config.namespace, index),
            seed: config.seed,
            eager: true,
        }
    }

    /// Reject parameters no backend can be built from
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.capacity == 0 {
            return Err(FilterError::InvalidParameters(format!(
                "tier {} capacity cannot be 0",
                self.identifier
            )));
        }
        if self.hash_count == 0 {
            return Err(FilterError::InvalidParameters(format!(
                "tier {} hash count cannot be 0",
                self.identifier
            )));
        }
        let p = self.target_probability;
        if !(p > 0.0 && p < 1.0) {
            return Err(FilterError::InvalidProbability { probability: p });
        }
        Ok(())
    }

    /// Elements this tier holds at its designed error probability
    pub fn element_limit(&self) -> u64 {
        element_limit(self.capacity, self.target_probability)
    }
}

/// Tier identifier: `"<namespace>/<index>"`
pub fn key_for_index(namespace: &str, index: usize) -> String {
    format!("{}/{}", namespace, index)
}
