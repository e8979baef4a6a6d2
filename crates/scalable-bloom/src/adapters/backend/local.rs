//! In-process tier backend over the domain [`BloomFilter`]

use crate::domain::{BloomFilter, TierParams};
use crate::error::FilterError;
use crate::ports::{BackendFactory, FilterBackend};

/// Tier backend holding its bit array in process memory
#[derive(Clone, Debug)]
pub struct LocalBloomBackend {
    filter: BloomFilter,
}

impl LocalBloomBackend {
    /// Build a backend sized by `params`
    ///
    /// With `eager == false` the bit array is allocated on first insert.
    pub fn new(params: &TierParams) -> Result<Self, FilterError> {
        params.validate()?;
        let m = usize::try_from(params.capacity).map_err(|_| {
            FilterError::InvalidParameters(format!(
                "tier {} capacity {} exceeds addressable memory",
                params.identifier, params.capacity
            ))
        })?;
        let k = params.hash_count as usize;

        let filter = if params.eager {
            BloomFilter::new(m, k, params.seed)
        } else {
            BloomFilter::new_lazy(m, k, params.seed)
        };
        Ok(Self { filter })
    }

    /// Rebuild from a payload produced by [`FilterBackend::to_payload`]
    pub fn from_payload(params: &TierParams, payload: &[u8]) -> Result<Self, FilterError> {
        let filter = BloomFilter::from_bytes(payload)?;
        if filter.size_bits() as u64 != params.capacity
            || filter.hash_count() != params.hash_count as usize
            || filter.seed() != params.seed
        {
            return Err(FilterError::InvalidParameters(format!(
                "payload of tier {} does not match its parameters",
                params.identifier
            )));
        }
        Ok(Self { filter })
    }

    /// The underlying filter
    pub fn filter(&self) -> &BloomFilter {
        &self.filter
    }
}

impl FilterBackend for LocalBloomBackend {
    fn insert(&mut self, key: &[u8]) -> Result<bool, FilterError> {
        Ok(self.filter.insert(key))
    }

    fn include(&self, key: &[u8]) -> Result<bool, FilterError> {
        Ok(self.filter.contains(key))
    }

    fn count(&self) -> Result<u64, FilterError> {
        Ok(self.filter.elements_inserted())
    }

    fn to_payload(&self) -> Result<Vec<u8>, FilterError> {
        Ok(self.filter.to_bytes()?)
    }
}

/// Builds [`LocalBloomBackend`] tiers
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalBackendFactory;

impl BackendFactory for LocalBackendFactory {
    fn create(&self, params: &TierParams) -> Result<Box<dyn FilterBackend>, FilterError> {
        Ok(Box::new(LocalBloomBackend::new(params)?))
    }

    fn restore(
        &self,
        params: &TierParams,
        payload: &[u8],
    ) -> Result<Box<dyn FilterBackend>, FilterError> {
        Ok(Box::new(LocalBloomBackend::from_payload(params, payload)?))
    }
}
