//! Adapters Layer (Driven Adapters)
//!
//! Implementations of the outbound ports.
//!
//! ## Adapters
//!
//! - `backend` - `LocalBloomBackend` (in process) and `KeyedStoreBackend`
//!   (bits in a shared `KeyValueStore`)
//! - `storage` - `InMemoryKVStore` and `FileBackedKVStore`
//! - `persistence` - versioned snapshots, `FsBlobStore`, `SnapshotStore`
//! - `lock` - `NamespaceLock`, one writer per namespace across processes

pub mod backend;
pub mod lock;
pub mod persistence;
pub mod storage;

pub use backend::{KeyedBackendFactory, KeyedStoreBackend, LocalBackendFactory, LocalBloomBackend};
pub use lock::NamespaceLock;
pub use persistence::{
    decode_snapshot, encode_snapshot, read_snapshot_file, write_snapshot_file, FsBlobStore,
    SnapshotStore,
};
pub use storage::{FileBackedKVStore, InMemoryKVStore};
