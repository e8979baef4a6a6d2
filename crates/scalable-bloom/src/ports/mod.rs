//! Ports Layer
//!
//! Defines the interfaces (traits) for:
//! - Driving Ports (inbound) - API for external callers
//! - Driven Ports (outbound) - Tier backends, keyed storage, blob storage

pub mod inbound;
pub mod outbound;

pub use inbound::ScalableFilterApi;
pub use outbound::{
    BackendFactory, BlobStore, FilterBackend, KeyValueStore, SystemTimeSource, TimeSource,
};
