//! Tier backend whose bits live in a shared [`KeyValueStore`]
//!
//! Storage layout per tier:
//! - `<identifier>`       bit array, `ceil(capacity / 8)` bytes
//! - `<identifier>#count` little-endian u64 insert counter
//!
//! Any controller configured with the same namespace and seed addresses the
//! same keys, so tiers are shared between processes through the store.

use std::sync::Arc;

use tracing::trace;

use crate::domain::hash_functions::compute_hash_positions;
use crate::domain::TierParams;
use crate::error::FilterError;
use crate::ports::outbound::decode_counter;
use crate::ports::{BackendFactory, FilterBackend, KeyValueStore};

const COUNT_SUFFIX: &str = "#count";

/// Tier backend over a shared keyed store
pub struct KeyedStoreBackend {
    store: Arc<dyn KeyValueStore>,
    bits_key: Vec<u8>,
    count_key: Vec<u8>,
    capacity: usize,
    hash_count: usize,
    seed: u32,
}

impl KeyedStoreBackend {
    /// Attach to the tier named by `params.identifier`
    ///
    /// With `eager` set, a zeroed bit array is reserved unless one already
    /// exists under the identifier.
    pub fn new(store: Arc<dyn KeyValueStore>, params: &TierParams) -> Result<Self, FilterError> {
        params.validate()?;
        let capacity = usize::try_from(params.capacity).map_err(|_| {
            FilterError::InvalidParameters(format!(
                "tier {} capacity {} exceeds addressable memory",
                params.identifier, params.capacity
            ))
        })?;

        let backend = Self {
            store,
            bits_key: params.identifier.as_bytes().to_vec(),
            count_key: format!("{}{}", params.identifier, COUNT_SUFFIX).into_bytes(),
            capacity,
            hash_count: params.hash_count as usize,
            seed: params.seed,
        };

        if params.eager {
            backend
                .store
                .allocate_bits(&backend.bits_key, params.capacity)?;
        }
        Ok(backend)
    }

    fn positions(&self, key: &[u8]) -> Vec<usize> {
        compute_hash_positions(key, self.hash_count, self.capacity, self.seed)
    }
}

impl FilterBackend for KeyedStoreBackend {
    fn insert(&mut self, key: &[u8]) -> Result<bool, FilterError> {
        let flipped = self.store.set_bits_and_increment(
            &self.bits_key,
            &self.positions(key),
            &self.count_key,
            1,
        )?;
        if !flipped {
            trace!(
                tier = %String::from_utf8_lossy(&self.bits_key),
                "All bits already set"
            );
        }
        Ok(flipped)
    }

    fn include(&self, key: &[u8]) -> Result<bool, FilterError> {
        Ok(self.store.test_bits(&self.bits_key, &self.positions(key))?)
    }

    fn count(&self) -> Result<u64, FilterError> {
        Ok(match self.store.get(&self.count_key)? {
            Some(bytes) => decode_counter(&self.count_key, &bytes)?,
            None => 0,
        })
    }

    fn delete(&mut self) -> Result<(), FilterError> {
        self.store.delete(&self.bits_key)?;
        self.store.delete(&self.count_key)?;
        Ok(())
    }

    /// The bits stay in the store; snapshots only record the tier parameters.
    fn to_payload(&self) -> Result<Vec<u8>, FilterError> {
        Ok(Vec::new())
    }
}

/// Builds [`KeyedStoreBackend`] tiers over one shared store
#[derive(Clone)]
pub struct KeyedBackendFactory {
    store: Arc<dyn KeyValueStore>,
}

impl KeyedBackendFactory {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The store every tier is built over
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }
}

impl BackendFactory for KeyedBackendFactory {
    fn create(&self, params: &TierParams) -> Result<Box<dyn FilterBackend>, FilterError> {
        Ok(Box::new(KeyedStoreBackend::new(self.store.clone(), params)?))
    }

    fn restore(
        &self,
        params: &TierParams,
        _payload: &[u8],
    ) -> Result<Box<dyn FilterBackend>, FilterError> {
        Ok(Box::new(KeyedStoreBackend::new(self.store.clone(), params)?))
    }
}
