//! # Scalable Bloom
//!
//! Approximate-membership deduplication over an unbounded stream of keys.
//!
//! A scalable filter is a growing sequence of fixed-capacity Bloom filter
//! tiers. Once the accepted keys reach the cumulative capacity of the
//! allocated tiers, a new tier is appended with a larger bit capacity and a
//! tighter error probability. The per-tier probabilities form a geometric
//! series, so the false positive rate of the whole filter stays below the
//! configured bound however many tiers accumulate.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure business logic, no I/O
//!   - `BloomFilter`: Core probabilistic data structure
//!   - `ScalableConfig`: Configuration with validation
//!   - `ScalableConfigBuilder`: Fluent builder for configuration
//!   - `TierParams`: Sizing schedule for tier `i`
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `ScalableFilterApi`: Driving port (inbound API)
//!   - `FilterBackend` / `BackendFactory`: Driven ports for tier storage
//!   - `KeyValueStore`, `BlobStore`, `TimeSource`: environment dependencies
//!
//! - **Service Layer** (`service/`): Orchestration
//!   - `ScalableFilter`: Implements `ScalableFilterApi`
//!
//! - **Adapters Layer** (`adapters/`): External connections
//!   - `LocalBloomBackend` / `KeyedStoreBackend`: tier backends
//!   - `InMemoryKVStore` / `FileBackedKVStore`: keyed stores
//!   - `SnapshotStore` / `FsBlobStore`: versioned snapshot persistence
//!   - `NamespaceLock`: cross-process writer lock
//!
//! ## Invariants
//!
//! - **No false negatives**: once `insert(k)` returns, `include(k)` is true
//! - **Bounded error**: sum of tier probabilities <= `error_probability_bound`
//! - **Append-only tiers**: tier `i` is named `"<namespace>/<i>"` and never
//!   removed or reordered
//!
//! ## Usage Example
//!
//! ```
//! use scalable_bloom::{ScalableConfigBuilder, ScalableFilter, ScalableFilterApi};
//!
//! let config = ScalableConfigBuilder::new()
//!     .initial_size(1_000)
//!     .error_probability_bound(0.01)
//!     .namespace("dedup")
//!     .build()
//!     .unwrap();
//!
//! let mut filter = ScalableFilter::new(config).unwrap();
//! assert!(filter.insert(b"order:1234").unwrap());
//! assert!(!filter.insert(b"order:1234").unwrap());
//! assert!(filter.include(b"order:1234").unwrap());
//! assert_eq!(filter.keys(), vec!["dedup/0"]);
//! ```
//!
//! ## Shared Tiers
//!
//! ```
//! use std::sync::Arc;
//! use scalable_bloom::{
//!     InMemoryKVStore, KeyedBackendFactory, ScalableConfig, ScalableFilter, ScalableFilterApi,
//! };
//!
//! let store = Arc::new(InMemoryKVStore::new());
//! let factory = Arc::new(KeyedBackendFactory::new(store));
//!
//! let mut writer = ScalableFilter::with_backend(ScalableConfig::default(), factory.clone()).unwrap();
//! writer.insert(b"key").unwrap();
//!
//! let mut reader = ScalableFilter::with_backend(ScalableConfig::default(), factory).unwrap();
//! reader.add_filter().unwrap();
//! assert!(reader.include(b"key").unwrap());
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-exports for convenience
pub use adapters::{
    read_snapshot_file, write_snapshot_file, FileBackedKVStore, FsBlobStore, InMemoryKVStore,
    KeyedBackendFactory, KeyedStoreBackend, LocalBackendFactory, LocalBloomBackend, NamespaceLock,
    SnapshotStore,
};
pub use domain::{BloomFilter, ScalableConfig, ScalableConfigBuilder, TierParams};
pub use error::{FilterError, LockError, SnapshotError, StoreError};
pub use metrics::{Metrics, MetricsRecorder, MetricsSnapshot, NoOpMetrics};
pub use ports::{
    BackendFactory, BlobStore, FilterBackend, KeyValueStore, ScalableFilterApi, SystemTimeSource,
    TimeSource,
};
pub use service::{ScalableFilter, Tier};
