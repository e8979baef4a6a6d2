//! Domain Layer - Pure business logic
//!
//! This layer contains:
//! - Core Bloom filter implementation
//! - Hash functions
//! - Sizing formulas
//! - Configuration
//! - Tier sizing schedule
//! - Snapshot state records
//!
//! RULES:
//! - No I/O operations
//! - Pure functions where possible

pub mod bloom_filter;
pub mod config;
pub mod hash_functions;
pub mod parameters;
pub mod state;
pub mod tier;

pub use bloom_filter::BloomFilter;
pub use config::{ScalableConfig, ScalableConfigBuilder, SCHEMA_V1, SCHEMA_V2};
pub use parameters::{calculate_fpr, element_limit, hash_count};
pub use state::{ControllerState, TierRecord};
pub use tier::{key_for_index, TierParams};
