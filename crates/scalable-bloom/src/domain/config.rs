//! Scalable filter configuration and validation
//!
//! # Example
//!
//! ```
//! use scalable_bloom::domain::ScalableConfigBuilder;
//!
//! let config = ScalableConfigBuilder::new()
//!     .initial_size(1_000)
//!     .error_probability_bound(0.01)
//!     .namespace("dedup")
//!     .seed(1447271)
//!     .build()
//!     .expect("Valid config");
//! assert_eq!(config.growth_factor, 2.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::ports::TimeSource;

/// Schema version without weighted-count tracking
pub const SCHEMA_V1: u8 = 1;
/// Schema version with weighted-count tracking
pub const SCHEMA_V2: u8 = 2;

/// Scalable filter configuration
///
/// Immutable once a controller has been built from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalableConfig {
    /// Bit capacity of tier 0
    pub initial_size: u64,
    /// Ceiling on the cumulative false positive probability across all tiers
    pub error_probability_bound: f64,
    /// Per-tier shrink factor applied to the error probability, in (0, 1)
    pub tightening_factor: f64,
    /// Per-tier growth factor applied to bit capacity, > 1
    pub growth_factor: f64,
    /// Prefix of every tier identifier
    pub namespace: String,
    /// Hash seed forwarded to every tier backend
    pub seed: u32,
    /// 1 or 2; version 2 tracks weighted counts
    pub schema_version: u8,
}

impl Default for ScalableConfig {
    fn default() -> Self {
        Self {
            initial_size: 100,
            error_probability_bound: 0.01,
            tightening_factor: 0.5,
            growth_factor: 2.0,
            namespace: "scalable".to_string(),
            seed: 0,
            schema_version: SCHEMA_V2,
        }
    }
}

impl ScalableConfig {
    /// Validate sizes, probabilities and factors
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.initial_size == 0 {
            return Err(FilterError::InvalidParameters(
                "initial_size cannot be 0".to_string(),
            ));
        }

        let bound = self.error_probability_bound;
        if !(bound > 0.0 && bound < 1.0) {
            return Err(FilterError::InvalidProbability { probability: bound });
        }

        let tightening = self.tightening_factor;
        if !(tightening > 0.0 && tightening < 1.0) {
            return Err(FilterError::InvalidFactor {
                name: "tightening_factor",
                value: tightening,
            });
        }

        let growth = self.growth_factor;
        if growth.is_nan() || growth <= 1.0 || growth.is_infinite() {
            return Err(FilterError::InvalidFactor {
                name: "growth_factor",
                value: growth,
            });
        }

        if self.namespace.is_empty() {
            return Err(FilterError::InvalidParameters(
                "namespace cannot be empty".to_string(),
            ));
        }

        if self.schema_version != SCHEMA_V1 && self.schema_version != SCHEMA_V2 {
            return Err(FilterError::InvalidSchemaVersion(self.schema_version));
        }

        Ok(())
    }

    /// Error probability of tier 0: `bound * (1 - tightening)`
    pub fn initial_probability(&self) -> f64 {
        self.error_probability_bound * (1.0 - self.tightening_factor)
    }

    /// Whether weighted counts are tracked
    pub fn tracks_weight(&self) -> bool {
        self.schema_version >= SCHEMA_V2
    }

    /// Parse and validate a JSON configuration
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, FilterError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FilterError::InvalidParameters(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, FilterError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FilterError::InvalidParameters(format!("config: {}", e)))
    }
}

/// Builder for ScalableConfig with validation
#[derive(Default)]
pub struct ScalableConfigBuilder {
    initial_size: Option<u64>,
    error_probability_bound: Option<f64>,
    tightening_factor: Option<f64>,
    growth_factor: Option<f64>,
    namespace: Option<String>,
    seed: Option<u32>,
    schema_version: Option<u8>,
}

impl ScalableConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bit capacity of tier 0
    pub fn initial_size(mut self, bits: u64) -> Self {
        self.initial_size = Some(bits);
        self
    }

    /// Set the cumulative false positive bound
    pub fn error_probability_bound(mut self, bound: f64) -> Self {
        self.error_probability_bound = Some(bound);
        self
    }

    /// Set the per-tier error probability shrink factor
    pub fn tightening_factor(mut self, factor: f64) -> Self {
        self.tightening_factor = Some(factor);
        self
    }

    /// Set the per-tier capacity growth factor
    pub fn growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = Some(factor);
        self
    }

    /// Set the tier identifier prefix
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the hash seed
    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Derive the hash seed from a clock (seconds since epoch, truncated)
    pub fn seed_from_clock(self, clock: &dyn TimeSource) -> Self {
        self.seed(clock.now() as u32)
    }

    /// Set the schema version (1 or 2)
    pub fn schema_version(mut self, version: u8) -> Self {
        self.schema_version = Some(version);
        self
    }

    /// Build the configuration, validating all parameters
    pub fn build(self) -> Result<ScalableConfig, FilterError> {
        let defaults = ScalableConfig::default();

        let config = ScalableConfig {
            initial_size: self.initial_size.unwrap_or(defaults.initial_size),
            error_probability_bound: self
                .error_probability_bound
                .unwrap_or(defaults.error_probability_bound),
            tightening_factor: self.tightening_factor.unwrap_or(defaults.tightening_factor),
            growth_factor: self.growth_factor.unwrap_or(defaults.growth_factor),
            namespace: self.namespace.unwrap_or(defaults.namespace),
            seed: self.seed.unwrap_or(defaults.seed),
            schema_version: self.schema_version.unwrap_or(defaults.schema_version),
        };

        config.validate()?;
        Ok(config)
    }
}
