//! Tier Backends
//!
//! Implementations of the `FilterBackend` and `BackendFactory` ports.

mod keyed;
mod local;

pub use keyed::{KeyedBackendFactory, KeyedStoreBackend};
pub use local::{LocalBackendFactory, LocalBloomBackend};
