//! Scalable Filter Controller
//!
//! Owns an append-only sequence of tiers. Lookups fan out across every tier;
//! inserts go to the newest tier only, after a new tier has been appended if
//! the cumulative capacity ceiling was reached.
//!
//! ```text
//! insert(key) ──► include(key)? ──yes──► false (no state change)
//!                      │ no
//!                      ▼
//!          count >= ceiling? ──yes──► add_filter()
//!                      │
//!                      ▼
//!          newest tier.insert(key); count += 1; weighted_count += weight
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::adapters::backend::LocalBackendFactory;
use crate::domain::{
    key_for_index, ControllerState, ScalableConfig, TierParams, TierRecord, SCHEMA_V1, SCHEMA_V2,
};
use crate::error::{FilterError, SnapshotError};
use crate::metrics::{MetricsRecorder, NoOpMetrics};
use crate::ports::{BackendFactory, FilterBackend, ScalableFilterApi};

/// One allocated tier: its sizing parameters and the backend holding its bits
pub struct Tier {
    index: usize,
    params: TierParams,
    backend: Box<dyn FilterBackend>,
}

impl Tier {
    /// Position in creation order
    pub fn index(&self) -> usize {
        self.index
    }

    /// Parameters the backend was created with
    pub fn params(&self) -> &TierParams {
        &self.params
    }

    /// Stable identifier, `"<namespace>/<index>"`
    pub fn identifier(&self) -> &str {
        &self.params.identifier
    }

    /// The tier's backend
    pub fn backend(&self) -> &dyn FilterBackend {
        self.backend.as_ref()
    }
}

/// Scalable Bloom filter controller
///
/// Designed for single-threaded use: mutation takes `&mut self`, and the
/// membership check and the write in [`insert`](ScalableFilterApi::insert)
/// are separate backend calls.
pub struct ScalableFilter {
    config: ScalableConfig,
    factory: Arc<dyn BackendFactory>,
    tiers: Vec<Tier>,
    count: u64,
    /// `Some` only while weighted tracking is active (schema version 2)
    weighted_count: Option<u64>,
    /// Cached capacity ceiling; recomputed whenever a tier is appended
    filter_limit: u64,
    metrics: Arc<dyn MetricsRecorder>,
}

impl ScalableFilter {
    /// Create an empty controller with in-process tier backends
    pub fn new(config: ScalableConfig) -> Result<Self, FilterError> {
        Self::with_backend(config, Arc::new(LocalBackendFactory))
    }

    /// Create an empty controller whose tiers are built by `factory`
    pub fn with_backend(
        config: ScalableConfig,
        factory: Arc<dyn BackendFactory>,
    ) -> Result<Self, FilterError> {
        config.validate()?;
        let weighted_count = config.tracks_weight().then_some(0);

        Ok(Self {
            config,
            factory,
            tiers: Vec::new(),
            count: 0,
            weighted_count,
            filter_limit: 0,
            metrics: Arc::new(NoOpMetrics),
        })
    }

    /// Attach a metrics recorder
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The configuration this controller was built with
    pub fn config(&self) -> &ScalableConfig {
        &self.config
    }

    /// 1 when weighted tracking is inactive, 2 otherwise
    pub fn schema_version(&self) -> u8 {
        self.config.schema_version
    }

    /// Allocated tiers in creation order
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Identifier of tier `index`: exactly `"<namespace>/<index>"`
    pub fn key_for_index(&self, index: usize) -> String {
        key_for_index(&self.config.namespace, index)
    }

    /// Sizing parameters tier `index` is (or would be) created with
    pub fn tier_params(&self, index: usize) -> TierParams {
        TierParams::for_index(&self.config, index)
    }

    /// Elements the allocated tiers are designed to hold in total
    pub fn current_filter_limit(&self) -> u64 {
        self.filter_limit
    }

    /// Whether the next accepted key needs a new tier
    pub fn next_filter_limit_reached(&self) -> bool {
        self.count >= self.filter_limit
    }

    fn compute_filter_limit(&self) -> u64 {
        self.tiers
            .iter()
            .map(|tier| tier.params.element_limit())
            .sum()
    }

    /// Append the next tier and refresh the capacity ceiling
    pub fn add_filter(&mut self) -> Result<(), FilterError> {
        let index = self.tiers.len();
        let params = self.tier_params(index);
        params.validate()?;

        let backend = self.factory.create(&params)?;
        debug!(
            tier = %params.identifier,
            capacity = params.capacity,
            hash_count = params.hash_count,
            target_probability = params.target_probability,
            "Allocated scalable filter tier"
        );
        self.metrics.record_tier_added(params.capacity);

        self.tiers.push(Tier {
            index,
            params,
            backend,
        });
        self.filter_limit = self.compute_filter_limit();
        Ok(())
    }

    /// Capture configuration, counters and every tier's backend payload
    pub fn to_state(&self) -> Result<ControllerState, FilterError> {
        let tiers = self
            .tiers
            .iter()
            .map(|tier| {
                Ok(TierRecord {
                    params: tier.params.clone(),
                    payload: tier.backend.to_payload()?,
                })
            })
            .collect::<Result<Vec<_>, FilterError>>()?;

        Ok(ControllerState {
            config: self.config.clone(),
            tiers,
            count: self.count,
            weighted_count: self.weighted_count,
        })
    }

    /// Rebuild a controller from captured state
    ///
    /// State without a weighted count comes back as schema version 1 with
    /// weighted tracking inactive.
    pub fn from_state(
        state: ControllerState,
        factory: Arc<dyn BackendFactory>,
    ) -> Result<Self, FilterError> {
        let ControllerState {
            mut config,
            tiers: records,
            count,
            weighted_count,
        } = state;

        config.schema_version = if weighted_count.is_some() {
            SCHEMA_V2
        } else {
            SCHEMA_V1
        };
        config.validate()?;

        let mut tiers = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let expected = key_for_index(&config.namespace, index);
            if record.params.identifier != expected {
                return Err(SnapshotError::DataFormat(format!(
                    "tier {} has identifier {}, expected {}",
                    index, record.params.identifier, expected
                ))
                .into());
            }
            record.params.validate()?;
            let backend = factory.restore(&record.params, &record.payload)?;
            tiers.push(Tier {
                index,
                params: record.params,
                backend,
            });
        }

        let mut filter = Self {
            config,
            factory,
            tiers,
            count,
            weighted_count,
            filter_limit: 0,
            metrics: Arc::new(NoOpMetrics),
        };
        filter.filter_limit = filter.compute_filter_limit();
        Ok(filter)
    }
}

impl ScalableFilterApi for ScalableFilter {
    fn insert_weighted(&mut self, key: &[u8], weight: u64) -> Result<bool, FilterError> {
        let start = Instant::now();

        if self.include(key)? {
            self.metrics.record_insert(start.elapsed(), false);
            return Ok(false);
        }

        if self.next_filter_limit_reached() {
            self.add_filter()?;
        }

        let tier = match self.tiers.last_mut() {
            Some(tier) => tier,
            None => {
                return Err(FilterError::InvalidParameters(
                    "no tier allocated for insert".to_string(),
                ))
            }
        };
        if !tier.backend.insert(key)? {
            // Only possible when another writer shares this tier's storage
            trace!(tier = %tier.params.identifier, "Tier already held key at insert time");
        }

        self.count += 1;
        if let Some(weighted) = self.weighted_count.as_mut() {
            *weighted = weighted.saturating_add(weight);
        }

        self.metrics.record_insert(start.elapsed(), true);
        Ok(true)
    }

    fn include(&self, key: &[u8]) -> Result<bool, FilterError> {
        let start = Instant::now();
        let mut found = false;
        for tier in &self.tiers {
            if tier.backend.include(key)? {
                found = true;
                break;
            }
        }
        self.metrics.record_lookup(start.elapsed(), found);
        Ok(found)
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn weighted_count(&self) -> Option<u64> {
        self.weighted_count
    }

    fn size(&self) -> usize {
        self.tiers.len()
    }

    fn keys(&self) -> Vec<String> {
        self.tiers
            .iter()
            .map(|tier| tier.params.identifier.clone())
            .collect()
    }

    fn delete_all(&mut self) -> Result<(), FilterError> {
        for tier in &mut self.tiers {
            tier.backend.delete()?;
        }
        debug!(
            namespace = %self.config.namespace,
            tiers = self.tiers.len(),
            "Released tier storage"
        );
        Ok(())
    }
}

impl fmt::Debug for ScalableFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalableFilter")
            .field("config", &self.config)
            .field("tiers", &self.keys())
            .field("count", &self.count)
            .field("weighted_count", &self.weighted_count)
            .field("filter_limit", &self.filter_limit)
            .finish()
    }
}
