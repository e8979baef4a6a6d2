//! Outbound Ports (Driven Ports)
//!
//! Dependencies the scalable filter needs from its environment: tier
//! backends, keyed storage for shared tiers, blob storage for snapshots, and
//! a clock.

use std::path::Path;

use crate::domain::TierParams;
use crate::error::{FilterError, SnapshotError, StoreError};

/// One tier's probabilistic filter (Driven Port)
///
/// Implementations never report false negatives; false positives stay near
/// the tier's `target_probability` until its element limit is reached.
pub trait FilterBackend: Send + Sync {
    /// Insert a key, returning whether it was newly added
    fn insert(&mut self, key: &[u8]) -> Result<bool, FilterError>;

    /// Test whether a key might be present
    fn include(&self, key: &[u8]) -> Result<bool, FilterError>;

    /// Number of successful inserts recorded by this backend
    fn count(&self) -> Result<u64, FilterError>;

    /// Release any durable storage addressed by the tier identifier
    fn delete(&mut self) -> Result<(), FilterError> {
        Ok(())
    }

    /// Opaque state carried inside controller snapshots
    fn to_payload(&self) -> Result<Vec<u8>, FilterError>;
}

/// Constructs tier backends (Driven Port)
///
/// The controller depends only on this trait, never on a concrete backend.
pub trait BackendFactory: Send + Sync {
    /// Build a fresh backend for a new tier
    fn create(&self, params: &TierParams) -> Result<Box<dyn FilterBackend>, FilterError>;

    /// Rebuild a backend from a snapshot payload produced by `to_payload`
    fn restore(
        &self,
        params: &TierParams,
        payload: &[u8],
    ) -> Result<Box<dyn FilterBackend>, FilterError>;
}

/// Abstract interface for shared keyed storage.
///
/// Every method takes `&self`: stores are shared between controllers through
/// `Arc`. [`FileBackedKVStore`](crate::adapters::FileBackedKVStore) handles
/// opened on one path also share contents between processes.
///
/// Bit values are stored little-endian within each byte (bit `i` lives in
/// byte `i / 8` at position `i % 8`).
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a single key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Delete a key.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, StoreError>;

    /// Reserve a zeroed bit array of `len_bits` under `key` unless one exists.
    fn allocate_bits(&self, key: &[u8], len_bits: u64) -> Result<(), StoreError> {
        if !self.exists(key)? {
            self.put(key, &vec![0u8; len_bits.div_ceil(8) as usize])?;
        }
        Ok(())
    }

    /// Set bits, returning whether any of them was previously clear.
    ///
    /// The default implementation is a read-modify-write and is only atomic
    /// if the store serializes callers; stores override it where they can.
    fn set_bits(&self, key: &[u8], positions: &[usize]) -> Result<bool, StoreError> {
        let mut bytes = self.get(key)?.unwrap_or_default();
        let changed = set_positions(&mut bytes, positions);
        if changed {
            self.put(key, &bytes)?;
        }
        Ok(changed)
    }

    /// Set bits and, if any was clear, add `by` to the counter under `counter`.
    ///
    /// Stores that can apply both changes as one unit override this so a
    /// failure never leaves bits set without the matching count.
    fn set_bits_and_increment(
        &self,
        key: &[u8],
        positions: &[usize],
        counter: &[u8],
        by: u64,
    ) -> Result<bool, StoreError> {
        let changed = self.set_bits(key, positions)?;
        if changed {
            self.increment(counter, by)?;
        }
        Ok(changed)
    }

    /// Whether every bit is set. A missing key tests as all clear.
    fn test_bits(&self, key: &[u8], positions: &[usize]) -> Result<bool, StoreError> {
        Ok(match self.get(key)? {
            Some(bytes) => all_positions_set(&bytes, positions),
            None => false,
        })
    }

    /// Add to a little-endian u64 counter, returning the new value.
    fn increment(&self, key: &[u8], by: u64) -> Result<u64, StoreError> {
        let current = match self.get(key)? {
            Some(bytes) => decode_counter(key, &bytes)?,
            None => 0,
        };
        let next = current.saturating_add(by);
        self.put(key, &next.to_le_bytes())?;
        Ok(next)
    }
}

/// Set bit positions in a byte buffer, growing it as needed.
pub(crate) fn set_positions(bytes: &mut Vec<u8>, positions: &[usize]) -> bool {
    let mut changed = false;
    for &pos in positions {
        let byte_idx = pos / 8;
        if byte_idx >= bytes.len() {
            bytes.resize(byte_idx + 1, 0);
        }
        let mask = 1u8 << (pos % 8);
        if bytes[byte_idx] & mask == 0 {
            bytes[byte_idx] |= mask;
            changed = true;
        }
    }
    changed
}

pub(crate) fn all_positions_set(bytes: &[u8], positions: &[usize]) -> bool {
    positions.iter().all(|&pos| {
        bytes
            .get(pos / 8)
            .map(|byte| byte & (1u8 << (pos % 8)) != 0)
            .unwrap_or(false)
    })
}

pub(crate) fn decode_counter(key: &[u8], bytes: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| StoreError::Corrupt {
        key: String::from_utf8_lossy(key).into_owned(),
        message: format!("counter must be 8 bytes, found {}", bytes.len()),
    })?;
    Ok(u64::from_le_bytes(raw))
}

/// Durable blob storage addressed by path (object store, shared volume...)
pub trait BlobStore: Send + Sync {
    /// Upload the contents of a local file under `path`.
    fn put_file(&self, path: &str, local: &Path) -> Result<(), SnapshotError>;

    /// Download the blob at `path` into a local file.
    fn fetch_to_file(&self, path: &str, local: &Path) -> Result<(), SnapshotError>;

    /// Remove the blob at `path`.
    fn delete(&self, path: &str) -> Result<(), SnapshotError>;
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Get current timestamp in seconds since epoch.
    fn now(&self) -> u64;
}

/// Default time source using system time.
#[derive(Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
