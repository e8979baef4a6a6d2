use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::ports::outbound::{all_positions_set, decode_counter, set_positions};
use crate::ports::KeyValueStore;

/// In-memory key-value store.
///
/// Shareable between controllers through `Arc`. Bit and counter updates
/// happen under one write lock, so `set_bits` is an atomic test-and-set.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.data.write().remove(key);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.data.read().contains_key(key))
    }

    fn allocate_bits(&self, key: &[u8], len_bits: u64) -> Result<(), StoreError> {
        self.data
            .write()
            .entry(key.to_vec())
            .or_insert_with(|| vec![0u8; len_bits.div_ceil(8) as usize]);
        Ok(())
    }

    fn set_bits(&self, key: &[u8], positions: &[usize]) -> Result<bool, StoreError> {
        let mut data = self.data.write();
        let bytes = data.entry(key.to_vec()).or_default();
        Ok(set_positions(bytes, positions))
    }

    fn set_bits_and_increment(
        &self,
        key: &[u8],
        positions: &[usize],
        counter: &[u8],
        by: u64,
    ) -> Result<bool, StoreError> {
        let mut data = self.data.write();
        let next = match data.get(counter) {
            Some(bytes) => decode_counter(counter, bytes)?.saturating_add(by),
            None => by,
        };
        let changed = set_positions(data.entry(key.to_vec()).or_default(), positions);
        if changed {
            data.insert(counter.to_vec(), next.to_le_bytes().to_vec());
        }
        Ok(changed)
    }

    fn test_bits(&self, key: &[u8], positions: &[usize]) -> Result<bool, StoreError> {
        Ok(self
            .data
            .read()
            .get(key)
            .map(|bytes| all_positions_set(bytes, positions))
            .unwrap_or(false))
    }

    fn increment(&self, key: &[u8], by: u64) -> Result<u64, StoreError> {
        let mut data = self.data.write();
        let current = match data.get(key) {
            Some(bytes) => decode_counter(key, bytes)?,
            None => 0,
        };
        let next = current.saturating_add(by);
        data.insert(key.to_vec(), next.to_le_bytes().to_vec());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_in_memory_kv_store() {
        let store = InMemoryKVStore::new();

        store.put(b"key1", b"value1").unwrap();
        store.put(b"key2", b"value2").unwrap();

        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get(b"key2").unwrap(), Some(b"value2".to_vec()));
        assert_eq!(store.get(b"key3").unwrap(), None);

        assert!(store.exists(b"key1").unwrap());
        assert!(!store.exists(b"key3").unwrap());

        store.delete(b"key1").unwrap();
        assert!(!store.exists(b"key1").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_allocate_bits_does_not_clobber() {
        let store = InMemoryKVStore::new();
        store.allocate_bits(b"ns/0", 100).unwrap();
        assert_eq!(store.get(b"ns/0").unwrap().unwrap().len(), 13);

        store.set_bits(b"ns/0", &[3]).unwrap();
        store.allocate_bits(b"ns/0", 100).unwrap();
        assert!(store.test_bits(b"ns/0", &[3]).unwrap());
    }

    #[test]
    fn test_set_bits_reports_flips() {
        let store = InMemoryKVStore::new();
        assert!(store.set_bits(b"b", &[1, 9]).unwrap());
        assert!(!store.set_bits(b"b", &[1, 9]).unwrap());
        assert!(store.test_bits(b"b", &[1, 9]).unwrap());
        assert!(!store.test_bits(b"b", &[2]).unwrap());
        assert!(!store.test_bits(b"missing", &[0]).unwrap());
    }

    #[test]
    fn test_increment() {
        let store = InMemoryKVStore::new();
        assert_eq!(store.increment(b"c", 1).unwrap(), 1);
        assert_eq!(store.increment(b"c", 4).unwrap(), 5);

        store.put(b"bad", b"xyz").unwrap();
        assert!(matches!(
            store.increment(b"bad", 1),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_set_bits_and_increment_counts_flips_only() {
        let store = InMemoryKVStore::new();
        assert!(store.set_bits_and_increment(b"b", &[2, 6], b"b#count", 1).unwrap());
        assert!(!store.set_bits_and_increment(b"b", &[2, 6], b"b#count", 1).unwrap());
        assert!(store.set_bits_and_increment(b"b", &[7], b"b#count", 1).unwrap());
        assert_eq!(store.increment(b"b#count", 0).unwrap(), 2);
    }

    #[test]
    fn test_corrupt_counter_leaves_bits_clear() {
        let store = InMemoryKVStore::new();
        store.put(b"b#count", b"xyz").unwrap();

        assert!(store.set_bits_and_increment(b"b", &[1], b"b#count", 1).is_err());
        assert!(!store.test_bits(b"b", &[1]).unwrap());
    }

    #[test]
    fn test_concurrent_set_bits_flip_once() {
        let store = Arc::new(InMemoryKVStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.set_bits(b"race", &[5, 17, 40]).unwrap())
            })
            .collect();

        let flips = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&flipped| flipped)
            .count();
        assert_eq!(flips, 1);
    }
}
